/*!
 * VM Runtime Library
 * Processes, mailboxes, external memory accounting and scheduling for a
 * small-footprint managed-language VM
 */

pub mod core;
pub mod memory;
pub mod monitoring;
pub mod process;
pub mod scheduler;

// Re-exports
pub use crate::core::{
    ConfigError, HeapConfig, ProcessError, RuntimeConfig, RuntimeError, RuntimeResult,
    SchedulerConfig, SchedulerError,
};
pub use memory::{
    AllocationManager, AllocationResult, ErrorObject, ExternalMemory, Finalizer, HeapObject,
    HeapRef, MemoryError, Object, ObjectHeap, Payload, Usage,
};
pub use monitoring::{init_tracing, try_init_tracing};
pub use process::{
    CleanupStats, ExternalBufferGroup, Message, Method, ObjectNotifier, ObjectNotifyMessage,
    Ownership, Process, ProcessBuilder, ProcessEntry, ProcessGroup, ProcessState, Program,
    ResourceGroup, RunOutcome, Signal, SignalSet, SnapshotBundle, SystemMessage,
    SystemMessageType,
};
pub use scheduler::{Scheduler, SchedulerStats, SchedulerThread};
