/*!
 * Core Module
 * Fundamental runtime types, configuration and error handling
 */

pub mod config;
pub mod errors;
pub mod guard;
pub mod limits;
pub mod links;
pub mod types;

// Re-export for convenience
pub use config::{HeapConfig, RuntimeConfig, SchedulerConfig};
pub use errors::*;
pub use guard::{Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
pub use links::{SlotHandle, SlotList};
pub use types::*;
