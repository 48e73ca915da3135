use super::*;
use serde_json::json;

fn sample_state() -> EntityState {
    EntityState {
        entity_id: EntityIdentifier::new(1, 3101, 7),
        marking: Some(EntityMarking::new("Alpha")),
        force_id: 1,
        entity_type: EntityType::lifeform(),
        location: Vector3::new(10.0, 20.0, 30.0),
        orientation: Vector3::ZERO,
        linear_velocity: Vector3::new(3.0, 4.0, 0.0),
        articulation: vec![],
        appearance: Appearance::default(),
    }
}

#[test]
fn test_identifier_equality_requires_all_fields() {
    let a = EntityIdentifier::new(1, 2, 3);
    assert_eq!(a, EntityIdentifier::new(1, 2, 3));
    assert_ne!(a, EntityIdentifier::new(9, 2, 3));
    assert_ne!(a, EntityIdentifier::new(1, 9, 3));
    assert_ne!(a, EntityIdentifier::new(1, 2, 9));
    assert_eq!(a.to_string(), "1:2:3");
}

#[test]
fn test_replace_methods_leave_original_untouched() {
    let state = sample_state();

    let moved = state.with_location(Vector3::new(1.0, 1.0, 1.0));
    assert_eq!(moved.location, Vector3::new(1.0, 1.0, 1.0));
    assert_eq!(state.location, Vector3::new(10.0, 20.0, 30.0));

    let hidden = state.with_appearance(state.appearance.with_active(false));
    assert!(!hidden.is_active());
    assert!(state.is_active());
    assert_eq!(hidden.entity_id, state.entity_id);
}

#[test]
fn test_velocity_magnitude() {
    assert_eq!(sample_state().linear_velocity.length(), 5.0);
}

#[test]
fn test_lifeform_with_echelon() {
    let team_type = EntityType::lifeform().with_echelon(Some(Echelon::Squad));
    assert_eq!(team_type.kind, EntityType::KIND_LIFEFORM);
    assert_eq!(team_type.echelon, Some(Echelon::Squad));
}

#[test]
fn test_deserialize_minimal_state_uses_defaults() {
    let state: EntityState = serde_json::from_value(json!({
        "entityId": { "siteId": 1, "applicationId": 2, "entityId": 3 },
        "forceId": 2,
        "entityType": { "kind": 1, "domain": 1, "country": 225, "category": 1,
                        "subcategory": 0, "specific": 0, "extra": 0 },
        "location": { "x": 1.0, "y": 2.0, "z": 3.0 }
    }))
    .unwrap();

    assert_eq!(state.marking_value(), None);
    assert!(state.is_active());
    assert!(state.articulation.is_empty());
    assert_eq!(state.orientation, Vector3::ZERO);
    assert_eq!(state.appearance.damage, Damage::Healthy);
}
