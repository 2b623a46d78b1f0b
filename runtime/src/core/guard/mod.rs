/*!
 * RAII Resource Guards
 *
 * Scoped ownership of runtime resources with automatic rollback.
 *
 * ## Guard Types
 *
 * - **AllocationManager**: external memory with accounting rollback
 *   (see `crate::memory::allocation`)
 *
 * ## Example
 *
 * ```ignore
 * let mut manager = AllocationManager::new(&process);
 * let buffer = manager.alloc(1024).ok_or(ErrorObject::OutOfMemory)?;
 * // Fill buffer, bail out early on errors...
 * let owned = manager.keep_result(); // Or auto-rollback on drop
 * ```
 */

mod traits;

pub use traits::{Guard, GuardDrop};

use crate::core::types::Pid;

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors that can occur during guard operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("Resource already released or handed off")]
    AlreadyReleased,

    #[error("Nothing to release: guard never acquired a resource")]
    NotAcquired,
}

/// Guard metadata for observability
#[derive(Debug, Clone)]
pub struct GuardMetadata {
    pub resource_type: &'static str,
    pub creation_time: std::time::Instant,
    pub pid: Option<Pid>,
    pub size_bytes: usize,
}

impl GuardMetadata {
    #[inline]
    pub fn new(resource_type: &'static str) -> Self {
        Self {
            resource_type,
            creation_time: std::time::Instant::now(),
            pid: None,
            size_bytes: 0,
        }
    }

    #[inline]
    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    #[inline]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size_bytes = size;
        self
    }

    #[inline]
    pub fn lifetime_micros(&self) -> u64 {
        self.creation_time.elapsed().as_micros() as u64
    }
}
