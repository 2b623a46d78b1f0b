/*!
 * Runtime Limits and Constants
 *
 * Centralized location for the runtime-wide limits and thresholds.
 * Grouped by domain: heap, external memory, process, scheduler.
 */

use super::types::{Fd, Micros};

// =============================================================================
// HEAP LIMITS
// =============================================================================

/// Heap block size used to report `number_of_blocks` (4KB)
/// Matches the page size of the embedded targets
pub const BLOCK_SIZE: usize = 4 * 1024;

/// Accounted size of every heap object header
pub const OBJECT_HEADER_SIZE: usize = 16;

/// Accounted size of one finalizer registration node
pub const FINALIZER_NODE_SIZE: usize = 32;

/// Largest string or byte array payload kept inside the object heap.
/// Bigger payloads are allocated externally and accounted as such.
pub const MAX_INTERNAL_PAYLOAD: usize = 1024;

/// Largest payload length the allocation helpers accept (1GB)
pub const MAX_PAYLOAD_LENGTH: usize = 1 << 30;

// =============================================================================
// EXTERNAL MEMORY LIMITS
// =============================================================================

/// Default soft limit for external allocations on desktop (64MB)
pub const DEFAULT_EXTERNAL_LIMIT: usize = 64 * 1024 * 1024;

/// Soft limit for external allocations on embedded targets (256KB)
pub const EMBEDDED_EXTERNAL_LIMIT: usize = 256 * 1024;

/// Hard heap ceiling (object + external bytes) on embedded targets (512KB)
pub const EMBEDDED_MAX_HEAP_SIZE: usize = 512 * 1024;

// =============================================================================
// PROCESS
// =============================================================================

/// Initial value of a process' current directory handle
pub const CURRENT_DIRECTORY_UNSET: Fd = -1;

/// Number of seed bytes consumed by `random_seed`
pub const RANDOM_SEED_BYTES: usize = 16;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Time slice before a running process is asked to yield (20ms)
pub const DEFAULT_TIME_SLICE_US: Micros = 20_000;

/// Unyielded run time after which the watchdog signal is raised (10s)
pub const DEFAULT_WATCHDOG_BUDGET_US: Micros = 10_000_000;

/// Default number of scheduler threads
pub const DEFAULT_SCHEDULER_THREADS: usize = 4;
