/*!
 * Scheduler Module
 * Process tables, run list and lifecycle transitions
 */

#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod stats;
pub mod thread;

// Re-export for convenience
pub use scheduler::Scheduler;
pub use stats::{AtomicSchedulerStats, SchedulerStats};
pub use thread::{SchedulerThread, ThreadInfo};
