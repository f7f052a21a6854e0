//! Base Orch trait.

use async_trait::async_trait;

/// Base trait for all orchestration agents.
///
/// Each Orch owns its state exclusively and is driven by a single daemon
/// loop, so every call observes the effects of the previous one in full.
///
/// # Lifecycle
///
/// 1. Construction: the Orch is created with its configuration
/// 2. Event loop: `do_task()` is called when consumers have pending work,
///    `on_timer()` on every loop tick
/// 3. Shutdown: the Orch is dropped
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes pending entries from all consumers.
    async fn do_task(&mut self);

    /// Advances the Orch's notion of time to `now_ms` (milliseconds since
    /// the daemon started) and runs everything that became due.
    fn on_timer(&mut self, _now_ms: u64) {
        // Default: no-op
    }

    /// Returns true if this Orch has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
