/*!
 * Memory Module
 * Per-process object heap and external allocation accounting
 */

pub mod allocation;
pub mod heap;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use allocation::AllocationManager;
pub use heap::{Finalizer, HeapObject, HeapRef, ObjectHeap, Payload};
pub use traits::*;
pub use types::*;
