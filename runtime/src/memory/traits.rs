/*!
 * Memory Traits
 * External memory accounting abstraction
 */

use super::types::AllocationResult;
use crate::core::types::{Pid, Size};

/// Accounting target for memory that lives outside the object heap
///
/// Implemented by `Process`; `AllocationManager` is generic over it.
pub trait ExternalMemory {
    /// Owner used for logging
    fn owner(&self) -> Pid;

    /// Admission check; records `Success` or `HitLimit` as the last result
    fn should_allow_external_allocation(&self, size: Size) -> bool;

    /// Account for `size` newly allocated external bytes
    fn register_external_allocation(&self, size: Size);

    /// Give back `size` external bytes
    fn unregister_external_allocation(&self, size: Size);

    /// Overwrite the last allocation result (used for `OutOfMemory`)
    fn set_last_allocation_result(&self, result: AllocationResult);
}
