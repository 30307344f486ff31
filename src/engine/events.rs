//! The event contract consumed and produced by the engine.

use crate::clock::{TimeProvider, Timestamp};

/// Reserved partition id driven by wall-clock time.
pub const SYSTEM_PARTITION: &str = "SYSTEM";

/// One discrete, timestamped unit of behavior.
///
/// Identity (`name`, `partition_id`) is fixed at construction. `name` is an
/// explicit, stable kind label supplied by the variant, not derived from the
/// concrete type.
pub trait Event: Send + Sync {
    /// When this event is due. Simulated partitions teleport to this instant
    /// before executing it.
    fn time(&self) -> Timestamp;

    /// Stable kind label used in diagnostics and logs.
    fn name(&self) -> &str;

    /// Partition the engine routes this event to.
    fn partition_id(&self) -> &str;

    /// Run the behavior at `clock.now()` and return the follow-up events
    /// (the causal chain). Follow-ups may target any partition.
    fn execute(&self, clock: &dyn TimeProvider) -> Vec<Box<dyn Event>>;
}

pub fn is_system_partition(id: &str) -> bool {
    id == SYSTEM_PARTITION
}
