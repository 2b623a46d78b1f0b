/*!
 * Allocation Manager
 *
 * Scoped external allocation with guaranteed accounting rollback.
 *
 * An `AllocationManager` owns at most one external buffer registered against
 * a process. Dropping it without `keep_result` frees the buffer and
 * unregisters its size, so early returns on error paths never leak
 * accounting. `keep_result` disarms the guard; whoever takes the buffer must
 * later call `unregister_external_allocation` when freeing it.
 */

use super::traits::ExternalMemory;
use super::types::AllocationResult;
use crate::core::guard::{Guard, GuardDrop, GuardError, GuardMetadata, GuardResult};
use crate::core::types::Size;
use crate::process::Process;
use tracing::{trace, warn};

/// Scoped external allocation (see module docs)
///
/// # Example
///
/// ```ignore
/// let mut manager = AllocationManager::new(&process);
/// let Some(buffer) = manager.alloc(len) else {
///     return Err(ErrorObject::OutOfMemory);
/// };
/// decode_into(buffer)?; // Early return rolls back
/// let owned = manager.keep_result();
/// ```
pub struct AllocationManager<'a, M: ExternalMemory + ?Sized = Process> {
    memory: &'a M,
    buffer: Option<Vec<u8>>,
    size: Size,
    hit_limit: bool,
    // Set once the buffer was kept or rolled back
    settled: bool,
    metadata: GuardMetadata,
}

impl<'a, M: ExternalMemory + ?Sized> AllocationManager<'a, M> {
    /// Empty manager; nothing is allocated or accounted yet
    pub fn new(memory: &'a M) -> Self {
        Self {
            memory,
            buffer: None,
            size: 0,
            hit_limit: false,
            settled: false,
            metadata: GuardMetadata::new("external_memory").with_pid(memory.owner()),
        }
    }

    /// Take charge of an existing buffer, registering its size now
    pub fn adopt(memory: &'a M, buffer: Vec<u8>) -> Self {
        let size = buffer.len();
        memory.register_external_allocation(size);
        Self {
            memory,
            buffer: Some(buffer),
            size,
            hit_limit: false,
            settled: false,
            metadata: GuardMetadata::new("external_memory")
                .with_pid(memory.owner())
                .with_size(size),
        }
    }

    /// Admit, allocate and register `length` zeroed bytes
    ///
    /// Returns `None` when admission fails (`hit_limit()` becomes true) or
    /// when the system allocator refuses (last result `OutOfMemory`).
    ///
    /// # Panics
    /// If the manager already holds an allocation.
    pub fn alloc(&mut self, length: Size) -> Option<&mut [u8]> {
        assert!(
            self.buffer.is_none(),
            "AllocationManager already holds {} bytes",
            self.size
        );

        if !self.memory.should_allow_external_allocation(length) {
            self.hit_limit = true;
            trace!(pid = self.memory.owner(), length, "External allocation hit limit");
            return None;
        }

        let mut buffer = Vec::new();
        if buffer.try_reserve_exact(length).is_err() {
            self.memory
                .set_last_allocation_result(AllocationResult::OutOfMemory);
            warn!(pid = self.memory.owner(), length, "System allocator refused external allocation");
            return None;
        }
        buffer.resize(length, 0);

        self.memory.register_external_allocation(length);
        self.size = length;
        self.settled = false;
        self.metadata.size_bytes = length;
        self.buffer = Some(buffer);
        self.buffer.as_deref_mut()
    }

    /// Allocate `count * size` zeroed bytes; overflow counts as out of memory
    pub fn calloc(&mut self, count: Size, size: Size) -> Option<&mut [u8]> {
        let Some(length) = count.checked_mul(size) else {
            self.memory
                .set_last_allocation_result(AllocationResult::OutOfMemory);
            return None;
        };
        self.alloc(length)
    }

    /// Disarm the guard and hand the buffer to the caller
    ///
    /// The accounting stays registered; the caller unregisters it later.
    pub fn keep_result(&mut self) -> Option<Vec<u8>> {
        let buffer = self.buffer.take();
        if buffer.is_some() {
            self.settled = true;
        }
        self.size = 0;
        buffer
    }

    /// Admission failed on the last `alloc`
    #[inline]
    pub fn hit_limit(&self) -> bool {
        self.hit_limit
    }

    /// Bytes currently held (and accounted)
    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }
}

impl<M: ExternalMemory + ?Sized> Guard for AllocationManager<'_, M> {
    fn resource_type(&self) -> &'static str {
        "external_memory"
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn is_active(&self) -> bool {
        self.buffer.is_some()
    }

    fn release(&mut self) -> GuardResult<()> {
        if self.buffer.take().is_none() {
            return Err(if self.settled {
                GuardError::AlreadyReleased
            } else {
                GuardError::NotAcquired
            });
        }
        self.memory.unregister_external_allocation(self.size);
        trace!(
            pid = self.memory.owner(),
            size = self.size,
            lifetime_us = self.metadata.lifetime_micros(),
            "Rolled back external allocation"
        );
        self.size = 0;
        self.settled = true;
        Ok(())
    }
}

impl<M: ExternalMemory + ?Sized> GuardDrop for AllocationManager<'_, M> {
    fn on_drop(&mut self) {
        if self.is_active() {
            // Only fails when nothing is held, which was just checked.
            let _ = self.release();
        }
    }
}

impl<M: ExternalMemory + ?Sized> Drop for AllocationManager<'_, M> {
    #[inline]
    fn drop(&mut self) {
        self.on_drop();
    }
}
