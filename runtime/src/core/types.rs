/*!
 * Core Types
 * Common types used across the runtime
 */

use std::sync::OnceLock;
use std::time::Instant;

/// Process ID type (unique scheduler-wide for the lifetime of the process)
pub type Pid = u32;

/// Process group ID type
pub type GroupId = u32;

/// Task ID type (monotonic per process)
pub type TaskId = u32;

/// Opaque file-descriptor-like directory handle
pub type Fd = i32;

/// Size type for memory operations
pub type Size = usize;

/// Signed word, used where the VM can hand us negative lengths
pub type Word = isize;

/// Monotonic timestamp in microseconds
pub type Micros = i64;

/// Common result type for runtime operations
pub type RuntimeResult<T> = Result<T, super::errors::RuntimeError>;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds elapsed since the runtime first asked for the time
#[inline]
pub fn now_micros() -> Micros {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as Micros
}
