/*!
 * Process Module
 * Processes, their mailboxes, messages and resource ownership
 */

pub mod builder;
pub mod group;
pub mod mailbox;
pub mod message;
pub mod notifier;
#[allow(clippy::module_inception)]
pub mod process;
#[cfg(feature = "profiler")]
pub mod profiler;
pub mod program;
pub mod random;
pub mod resources;
pub mod types;

// Re-export for convenience
pub use builder::ProcessBuilder;
pub use group::ProcessGroup;
pub use mailbox::Mailbox;
pub use message::{
    Message, MessageType, ObjectNotifyMessage, Ownership, SystemMessage, SystemMessageType,
};
pub use notifier::ObjectNotifier;
pub use process::Process;
#[cfg(feature = "profiler")]
pub use profiler::Profiler;
pub use program::{Method, Program, SnapshotBundle};
pub use resources::{CleanupStats, ExternalBufferGroup, ResourceGroup};
pub use types::{ProcessEntry, ProcessState, RunOutcome, Signal, SignalSet};
