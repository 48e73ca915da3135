// Entity cache and the shared timer pool behind it

mod cache;
mod scheduler;

pub use cache::{EntityRegistry, Indexed, DEFAULT_ENTITY_TIMEOUT};
pub use scheduler::{Scheduler, TimerHandle};

#[cfg(test)]
mod tests;
