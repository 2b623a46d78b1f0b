/*!
 * Memory Types
 * Allocation results, usage snapshots and VM-visible error values
 */

use super::heap::HeapRef;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MemoryError {
    #[error("Allocation hit limit: requested {requested} bytes, {current} used of {limit}")]
    #[diagnostic(
        code(memory::hit_limit),
        help("Trigger a scavenge and retry, or raise the configured heap limits.")
    )]
    HitLimit {
        requested: usize,
        current: usize,
        limit: usize,
    },

    #[error("Out of memory: system allocator refused {requested} bytes")]
    #[diagnostic(
        code(memory::out_of_memory),
        help("The host allocator failed after the allocation was admitted.")
    )]
    OutOfMemory { requested: usize },

    #[error("Invalid allocation length: {0}")]
    #[diagnostic(code(memory::invalid_length), help("Lengths must be non-negative."))]
    InvalidLength(isize),
}

/// Outcome of the most recent allocation attempt, kept for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationResult {
    #[default]
    Success,
    /// Rejected by the configured soft/hard limit
    HitLimit,
    /// Admitted, but the system allocator failed
    OutOfMemory,
}

impl fmt::Display for AllocationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationResult::Success => write!(f, "ALLOCATION_SUCCESS"),
            AllocationResult::HitLimit => write!(f, "ALLOCATION_HIT_LIMIT"),
            AllocationResult::OutOfMemory => write!(f, "ALLOCATION_OUT_OF_MEMORY"),
        }
    }
}

/// Memory usage snapshot of one process heap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub label: String,
    pub object_bytes: usize,
    pub external_bytes: usize,
    pub objects: usize,
    pub finalizers: usize,
    pub gc_count: usize,
}

impl Usage {
    #[inline]
    pub fn total(&self) -> usize {
        self.object_bytes + self.external_bytes
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {} objects, {} bytes ({} external), {} GCs",
            self.label,
            self.objects,
            self.total(),
            self.external_bytes,
            self.gc_count
        )
    }
}

/// Error value handed back to the running program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorObject {
    OutOfMemory,
    InvalidArgument,
}

impl ErrorObject {
    pub const fn name(&self) -> &'static str {
        match self {
            ErrorObject::OutOfMemory => "OUT_OF_MEMORY",
            ErrorObject::InvalidArgument => "INVALID_ARGUMENT",
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<MemoryError> for ErrorObject {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::HitLimit { .. } | MemoryError::OutOfMemory { .. } => {
                ErrorObject::OutOfMemory
            }
            MemoryError::InvalidLength(_) => ErrorObject::InvalidArgument,
        }
    }
}

/// A single VM value: either a heap object or an error marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Object {
    Heap(HeapRef),
    Error(ErrorObject),
}

impl Object {
    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    #[inline]
    pub const fn heap_ref(&self) -> Option<HeapRef> {
        match self {
            Object::Heap(r) => Some(*r),
            Object::Error(_) => None,
        }
    }
}

impl From<Result<HeapRef, ErrorObject>> for Object {
    fn from(result: Result<HeapRef, ErrorObject>) -> Self {
        match result {
            Ok(r) => Object::Heap(r),
            Err(e) => Object::Error(e),
        }
    }
}
