/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{GroupId, Pid};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export MemoryError from memory module
pub use crate::memory::MemoryError;

/// Process-related errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Process {0} not found")]
    #[diagnostic(
        code(process::not_found),
        help("The process may have been reaped or never existed. Check PID validity.")
    )]
    NotFound(Pid),

    #[error("Failed to create process: {0}")]
    #[diagnostic(
        code(process::creation_failed),
        help("The initial heap objects could not be allocated. Raise the heap limits.")
    )]
    CreationFailed(String),

    #[error("Memory allocation failed: {0}")]
    #[diagnostic(
        code(process::memory_allocation_failed),
        help("The process hit its memory ceiling. Run a scavenge or free external buffers.")
    )]
    MemoryAllocationFailed(String),

    #[error("Profiler already installed for process {0}")]
    #[diagnostic(
        code(process::profiler_installed),
        help("Uninstall the current profiler before installing a new one.")
    )]
    ProfilerInstalled(Pid),
}

// Allow conversion from MemoryError to ProcessError
impl From<MemoryError> for ProcessError {
    fn from(err: MemoryError) -> Self {
        ProcessError::MemoryAllocationFailed(err.to_string())
    }
}

/// Scheduler-related errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedulerError {
    #[error("Process {0} not found in scheduler")]
    #[diagnostic(
        code(scheduler::process_not_found),
        help("Process may have terminated and been reaped.")
    )]
    ProcessNotFound(Pid),

    #[error("Process group {0} not found")]
    #[diagnostic(
        code(scheduler::group_not_found),
        help("Create the group with Scheduler::new_group before spawning into it.")
    )]
    GroupNotFound(GroupId),

    #[error("Process {pid} cannot {operation} in state {state}")]
    #[diagnostic(
        code(scheduler::invalid_state),
        help("Operation cannot be performed in the current process state.")
    )]
    InvalidState {
        pid: Pid,
        state: String,
        operation: String,
    },

    #[error("Process {0} has not terminated")]
    #[diagnostic(
        code(scheduler::not_terminated),
        help("Only terminated processes can be reaped.")
    )]
    NotTerminated(Pid),
}

/// Configuration errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    #[diagnostic(
        code(config::parse),
        help("The configuration must be a JSON object with `heap` and `scheduler` sections.")
    )]
    Parse(String),

    #[error("Invalid value for {key}: {value}")]
    #[diagnostic(code(config::invalid_value), help("Expected a non-negative integer."))]
    InvalidValue { key: String, value: String },
}

/// Unified runtime error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum RuntimeError {
    #[error("Memory error: {0}")]
    #[diagnostic(transparent)]
    Memory(#[from] MemoryError),

    #[error("Process error: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Scheduler error: {0}")]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}
