use super::*;
use crate::entity::{Appearance, EntityIdentifier, EntityState, EntityType, Vector3};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn state(entity: u16, active: bool) -> EntityState {
    EntityState {
        entity_id: EntityIdentifier::new(1, 1, entity),
        marking: None,
        force_id: 1,
        entity_type: EntityType::lifeform(),
        location: Vector3::new(entity as f64, 0.0, 0.0),
        orientation: Vector3::ZERO,
        linear_velocity: Vector3::ZERO,
        articulation: vec![],
        appearance: Appearance::default().with_active(active),
    }
}

/// Arms a timer that only counts how often it fired.
fn counting_arm(
    scheduler: &Scheduler,
    fired: &Arc<AtomicUsize>,
) -> impl FnOnce(EntityIdentifier, u64, Duration) -> TimerHandle {
    let scheduler = scheduler.clone();
    let fired = Arc::clone(fired);
    move |_, _, timeout| {
        scheduler.schedule(timeout, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_index_active_state_arms_timeout() {
    let scheduler = Scheduler::current();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut cache = EntityRegistry::default();

    let outcome = cache.index(state(1, true), counting_arm(&scheduler, &fired));

    assert!(matches!(outcome, Indexed::Tracked));
    assert!(cache.contains(&EntityIdentifier::new(1, 1, 1)));
    assert!(cache.pending_generation(&EntityIdentifier::new(1, 1, 1)).is_some());
    assert_eq!(cache.timeout(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_updates_coalesce_to_one_timeout() {
    let scheduler = Scheduler::current();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut cache = EntityRegistry::new(Duration::from_secs(30));
    let id = EntityIdentifier::new(1, 1, 1);

    cache.index(state(1, true), counting_arm(&scheduler, &fired));
    let first = cache.pending_generation(&id).unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    cache.index(state(1, true), counting_arm(&scheduler, &fired));
    tokio::time::sleep(Duration::from_secs(10)).await;
    cache.index(state(1, true), counting_arm(&scheduler, &fired));
    let last = cache.pending_generation(&id).unwrap();

    // 20s after the first update its timeout would have been due at 30s
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // The surviving timeout is relative to the last update
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // A stale generation no longer matches the entry
    assert!(cache.expire(&id, first).is_none());
    assert!(cache.expire(&id, last).is_some());
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_inactive_state_evicts_immediately() {
    let scheduler = Scheduler::current();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut cache = EntityRegistry::default();

    cache.index(state(1, true), counting_arm(&scheduler, &fired));
    let outcome = cache.index(state(1, false), counting_arm(&scheduler, &fired));

    match outcome {
        Indexed::Deactivated(last) => assert!(!last.is_active()),
        Indexed::Tracked => panic!("inactive state must not stay cached"),
    }
    assert!(cache.is_empty());

    // The cancelled timeout never fires
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remove_absent_entity_is_noop() {
    let mut cache = EntityRegistry::default();
    assert!(cache.remove(&EntityIdentifier::new(4, 4, 4)).is_none());
    assert!(cache.expire(&EntityIdentifier::new(4, 4, 4), 0).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_all_states_is_a_snapshot() {
    let scheduler = Scheduler::current();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut cache = EntityRegistry::default();

    cache.index(state(1, true), counting_arm(&scheduler, &fired));
    cache.index(state(2, true), counting_arm(&scheduler, &fired));

    let snapshot = cache.all_states();
    cache.remove(&EntityIdentifier::new(1, 1, 1));

    assert_eq!(snapshot.len(), 2);
    assert_eq!(cache.all_states().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drain_cancels_every_timeout() {
    let scheduler = Scheduler::current();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut cache = EntityRegistry::default();

    for entity in 1..=3 {
        cache.index(state(entity, true), counting_arm(&scheduler, &fired));
    }

    let drained = cache.drain();
    assert_eq!(drained.len(), 3);
    assert!(cache.is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_delay_task_stops_when_it_returns_false() {
    let scheduler = Scheduler::current();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&runs);
    let handle = scheduler.schedule_with_fixed_delay(Duration::from_secs(1), move || {
        counter.fetch_add(1, Ordering::SeqCst) < 2
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_zero_period_runs_at_minimum_period() {
    let scheduler = Scheduler::current();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&runs);
    let handle = scheduler.schedule_with_fixed_delay(Duration::ZERO, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let count = runs.load(Ordering::SeqCst);
    assert!((10..=11).contains(&count), "ran {} times", count);
    assert!(!handle.is_finished());
    handle.cancel();
}
