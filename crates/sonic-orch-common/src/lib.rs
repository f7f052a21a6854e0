//! Common orchestration abstractions for SONiC daemons.
//!
//! This crate provides the pieces every table-driven daemon in the
//! workspace is built from:
//!
//! - [`Orch`]: Base trait for orchestration agents driven by an event loop
//! - [`Consumer`]: Per-key pending-work queue, either merging (configuration
//!   tables) or strictly first-in first-out (runtime event streams)
//! - [`TaskStatus`] / [`TaskError`]: Outcome of processing one entry
//!
//! # Architecture
//!
//! 1. Configuration changes arrive as [`KeyOpFieldsValues`] entries
//! 2. Each table has a [`Consumer`] that coalesces pending work per key
//! 3. The daemon loop calls [`Orch::do_task`] when consumers have work and
//!    [`Orch::on_timer`] on every tick
//! 4. Entries that cannot be applied yet are handed back with
//!    [`Consumer::retry`]
//!
//! # Example
//!
//! ```ignore
//! use sonic_orch_common::{Consumer, Orch, TaskStatus};
//!
//! #[async_trait]
//! impl Orch for MyOrch {
//!     fn name(&self) -> &str { "MyOrch" }
//!
//!     async fn do_task(&mut self) {
//!         for entry in self.lag_consumer.drain() {
//!             if self.process(&entry).is_retryable() {
//!                 self.lag_consumer.retry(entry);
//!             }
//!         }
//!     }
//! }
//! ```

mod consumer;
mod orch;
mod task;

pub use consumer::{
    Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation, QueueDiscipline,
    QueueEntry,
};
pub use orch::Orch;
pub use task::{TaskError, TaskStatus};
