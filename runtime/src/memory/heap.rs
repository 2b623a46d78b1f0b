/*!
 * Object Heap
 *
 * Per-process arena of heap objects addressed by `HeapRef` handles.
 *
 * ## Model
 *
 * - **Roots**: objects start rooted (held by the running task); `release`
 *   drops the root and the next `scavenge` may reclaim them. The current task
 *   object and finalizer lambdas are always live.
 * - **Finalizers**: stored as tagged values keyed by handle. A dead key with a
 *   lambda finalizer survives one more cycle and its lambda is queued for
 *   `next_finalizer_to_run`; a dead key with a VM finalizer is reclaimed
 *   immediately and its external payload is unregistered.
 * - **Limits**: the soft limit bounds external bytes, the optional hard limit
 *   (`max_heap_size`) bounds object plus external bytes.
 */

use super::types::{AllocationResult, MemoryError, MemoryResult, Usage};
use crate::core::config::HeapConfig;
use crate::core::limits::{FINALIZER_NODE_SIZE, OBJECT_HEADER_SIZE};
use crate::core::types::Size;
use ahash::RandomState;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Handle to an object in an `ObjectHeap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRef {
    index: u32,
    generation: u32,
}

/// Byte storage of strings and byte arrays
#[derive(Debug)]
pub enum Payload {
    /// Stored inside the object heap, counted as object bytes
    Inline(Vec<u8>),
    /// Stored outside the object heap, counted as external bytes
    External(Vec<u8>),
}

impl Payload {
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Payload::Inline(bytes) | Payload::External(bytes) => bytes,
        }
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Payload::Inline(bytes) | Payload::External(bytes) => bytes,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn is_external(&self) -> bool {
        matches!(self, Payload::External(_))
    }

    fn inline_len(&self) -> usize {
        match self {
            Payload::Inline(bytes) => bytes.len(),
            Payload::External(_) => 0,
        }
    }

    fn external_len(&self) -> usize {
        match self {
            Payload::Inline(_) => 0,
            Payload::External(bytes) => bytes.len(),
        }
    }
}

/// Object stored in the heap
#[derive(Debug)]
pub enum HeapObject {
    String(Payload),
    ByteArray(Payload),
    /// Program-level object (instances, lambdas, tasks)
    Instance { class_id: u32 },
}

impl HeapObject {
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            HeapObject::String(payload) | HeapObject::ByteArray(payload) => Some(payload),
            HeapObject::Instance { .. } => None,
        }
    }

    pub fn payload_mut(&mut self) -> Option<&mut Payload> {
        match self {
            HeapObject::String(payload) | HeapObject::ByteArray(payload) => Some(payload),
            HeapObject::Instance { .. } => None,
        }
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeapObject::String(payload) => std::str::from_utf8(payload.bytes()).ok(),
            _ => None,
        }
    }

    /// Byte array content, if this is a byte array
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HeapObject::ByteArray(payload) => Some(payload.bytes()),
            _ => None,
        }
    }

    fn accounted_size(&self) -> usize {
        OBJECT_HEADER_SIZE + self.payload().map_or(0, Payload::inline_len)
    }

    fn external_len(&self) -> usize {
        self.payload().map_or(0, Payload::external_len)
    }
}

/// Finalizer registered for a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalizer {
    /// Program lambda to run once the key became unreachable
    Lambda(HeapRef),
    /// Native cleanup of the object's external payload
    Vm,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<HeapObject>,
    rooted: bool,
}

/// Garbage-collected heap of one process
#[derive(Debug)]
pub struct ObjectHeap {
    config: HeapConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    objects: usize,
    object_bytes: Size,
    external_bytes: Size,
    total_bytes_allocated: u64,
    finalizers: HashMap<HeapRef, Finalizer, RandomState>,
    finalizer_queue: VecDeque<HeapRef>,
    last_allocation_result: AllocationResult,
    gc_count: usize,
    task: Option<HeapRef>,
}

impl ObjectHeap {
    pub fn new(config: HeapConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            objects: 0,
            object_bytes: 0,
            external_bytes: 0,
            total_bytes_allocated: 0,
            finalizers: HashMap::with_hasher(RandomState::new()),
            finalizer_queue: VecDeque::new(),
            last_allocation_result: AllocationResult::Success,
            gc_count: 0,
            task: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Allocate a rooted object
    pub fn allocate(&mut self, object: HeapObject) -> MemoryResult<HeapRef> {
        let size = object.accounted_size();
        if !self.fits(size) {
            self.last_allocation_result = AllocationResult::HitLimit;
            return Err(MemoryError::HitLimit {
                requested: size,
                current: self.used(),
                limit: self.config.max_heap_size.unwrap_or(usize::MAX),
            });
        }

        let external = object.external_len();
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                slot.rooted = true;
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                    rooted: true,
                });
                (self.slots.len() - 1) as u32
            }
        };

        self.objects += 1;
        self.object_bytes += size;
        self.external_bytes += external;
        self.total_bytes_allocated += size as u64;
        self.last_allocation_result = AllocationResult::Success;

        Ok(HeapRef {
            index,
            generation: self.slots[index as usize].generation,
        })
    }

    /// Object behind `r`
    ///
    /// # Panics
    /// On a stale handle: the object was already reclaimed.
    pub fn get(&self, r: HeapRef) -> &HeapObject {
        match self.try_get(r) {
            Some(object) => object,
            None => panic!("stale heap reference {:?}", r),
        }
    }

    /// Mutable access to the object behind `r`
    ///
    /// # Panics
    /// On a stale handle.
    pub fn get_mut(&mut self, r: HeapRef) -> &mut HeapObject {
        match self.live_slot_mut(r).and_then(|slot| slot.object.as_mut()) {
            Some(object) => object,
            None => panic!("stale heap reference {:?}", r),
        }
    }

    pub fn try_get(&self, r: HeapRef) -> Option<&HeapObject> {
        self.slots
            .get(r.index as usize)
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.object.as_ref())
    }

    #[inline]
    pub fn is_live(&self, r: HeapRef) -> bool {
        self.try_get(r).is_some()
    }

    /// Keep `r` alive across scavenges
    pub fn root(&mut self, r: HeapRef) {
        self.expect_slot_mut(r).rooted = true;
    }

    /// Drop the root on `r`; the next scavenge may reclaim it
    pub fn release(&mut self, r: HeapRef) {
        self.expect_slot_mut(r).rooted = false;
    }

    /// Reclaim `r` immediately, skipping its finalizer
    pub fn discard(&mut self, r: HeapRef) {
        self.expect_slot_mut(r);
        self.drop_finalizer(r);
        self.reclaim(r.index);
    }

    /// Hand an externally allocated buffer to a string or byte array
    ///
    /// The buffer must already be registered as external memory.
    pub fn attach_external(&mut self, r: HeapRef, buffer: Vec<u8>) {
        let payload = match self.get_mut(r).payload_mut() {
            Some(payload) => payload,
            None => panic!("heap object {:?} has no payload", r),
        };
        assert!(payload.is_empty(), "heap object {:?} already has a payload", r);
        *payload = Payload::External(buffer);
    }

    // -------------------------------------------------------------------------
    // External memory accounting
    // -------------------------------------------------------------------------

    /// Admission check against the soft and hard limits
    pub fn should_allow_external_allocation(&self, size: Size) -> bool {
        let within_soft = self
            .external_bytes
            .checked_add(size)
            .map_or(false, |total| total <= self.config.external_limit);
        within_soft && self.fits(size)
    }

    pub fn register_external_allocation(&mut self, size: Size) {
        self.external_bytes += size;
        self.total_bytes_allocated += size as u64;
    }

    pub fn unregister_external_allocation(&mut self, size: Size) {
        assert!(
            size <= self.external_bytes,
            "unregistering {} external bytes with only {} registered",
            size,
            self.external_bytes
        );
        self.external_bytes -= size;
    }

    #[inline]
    pub fn external_bytes(&self) -> Size {
        self.external_bytes
    }

    #[inline]
    pub fn last_allocation_result(&self) -> AllocationResult {
        self.last_allocation_result
    }

    #[inline]
    pub fn set_last_allocation_result(&mut self, result: AllocationResult) {
        self.last_allocation_result = result;
    }

    /// The system allocator failed on the last admitted allocation
    #[inline]
    pub fn system_refused_memory(&self) -> bool {
        self.last_allocation_result == AllocationResult::OutOfMemory
    }

    pub fn set_max_heap_size(&mut self, bytes: Option<Size>) {
        self.config.max_heap_size = bytes;
    }

    // -------------------------------------------------------------------------
    // Finalizers
    // -------------------------------------------------------------------------

    pub fn has_finalizer(&self, key: HeapRef, lambda: HeapRef) -> bool {
        self.finalizers.get(&key) == Some(&Finalizer::Lambda(lambda))
    }

    /// Register `lambda` to run once `key` is unreachable
    ///
    /// Returns `false` if `key` already has a finalizer or the registry node
    /// does not fit in the heap.
    pub fn add_finalizer(&mut self, key: HeapRef, lambda: HeapRef) -> bool {
        self.expect_slot_mut(lambda);
        self.insert_finalizer(key, Finalizer::Lambda(lambda))
    }

    /// Register native cleanup of `key`'s external payload
    pub fn add_vm_finalizer(&mut self, key: HeapRef) -> bool {
        self.insert_finalizer(key, Finalizer::Vm)
    }

    pub fn remove_finalizer(&mut self, key: HeapRef) -> bool {
        self.expect_slot_mut(key);
        self.drop_finalizer(key)
    }

    /// Next queued finalizer lambda; it is rooted again for the caller
    pub fn next_finalizer_to_run(&mut self) -> Option<HeapRef> {
        while let Some(lambda) = self.finalizer_queue.pop_front() {
            if let Some(slot) = self.live_slot_mut(lambda) {
                slot.rooted = true;
                return Some(lambda);
            }
        }
        None
    }

    // -------------------------------------------------------------------------
    // Collection
    // -------------------------------------------------------------------------

    /// Reclaim unreachable objects; returns the number of objects freed
    pub fn scavenge(&mut self) -> usize {
        self.gc_count += 1;

        let mut live: HashSet<u32, RandomState> = HashSet::with_hasher(RandomState::new());
        live.extend(self.task.map(|r| r.index));
        live.extend(self.finalizer_queue.iter().map(|r| r.index));
        live.extend(self.finalizers.values().filter_map(|f| match f {
            Finalizer::Lambda(lambda) => Some(lambda.index),
            Finalizer::Vm => None,
        }));

        let dead: Vec<HeapRef> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(index, slot)| {
                slot.object.is_some() && !slot.rooted && !live.contains(&(*index as u32))
            })
            .map(|(index, slot)| HeapRef {
                index: index as u32,
                generation: slot.generation,
            })
            .collect();

        let mut freed = 0;
        let mut queued = 0;
        for r in dead {
            match self.finalizers.get(&r).copied() {
                Some(Finalizer::Lambda(lambda)) => {
                    self.drop_finalizer(r);
                    self.finalizer_queue.push_back(lambda);
                    queued += 1;
                }
                Some(Finalizer::Vm) => {
                    self.drop_finalizer(r);
                    self.reclaim(r.index);
                    freed += 1;
                }
                None => {
                    self.reclaim(r.index);
                    freed += 1;
                }
            }
        }

        debug!(
            gc_count = self.gc_count,
            freed,
            finalizers_queued = queued,
            object_bytes = self.object_bytes,
            external_bytes = self.external_bytes,
            "Scavenge complete"
        );
        freed
    }

    pub fn usage(&self, label: &str) -> Usage {
        Usage {
            label: label.to_string(),
            object_bytes: self.object_bytes,
            external_bytes: self.external_bytes,
            objects: self.objects,
            finalizers: self.finalizers.len(),
            gc_count: self.gc_count,
        }
    }

    #[inline]
    pub fn gc_count(&self) -> usize {
        self.gc_count
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects
    }

    #[inline]
    pub fn object_bytes(&self) -> Size {
        self.object_bytes
    }

    /// Monotonic count of all bytes ever allocated (objects and external)
    #[inline]
    pub fn total_bytes_allocated(&self) -> u64 {
        self.total_bytes_allocated
    }

    /// Heap blocks in use, at least one
    pub fn number_of_blocks(&self) -> usize {
        self.object_bytes.div_ceil(self.config.block_size).max(1)
    }

    #[inline]
    pub fn task(&self) -> Option<HeapRef> {
        self.task
    }

    pub fn set_task(&mut self, task: Option<HeapRef>) {
        if let Some(r) = task {
            self.expect_slot_mut(r);
        }
        self.task = task;
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    #[inline]
    fn used(&self) -> Size {
        self.object_bytes + self.external_bytes
    }

    fn fits(&self, size: Size) -> bool {
        match self.config.max_heap_size {
            Some(max) => self.used().checked_add(size).map_or(false, |total| total <= max),
            None => true,
        }
    }

    fn insert_finalizer(&mut self, key: HeapRef, finalizer: Finalizer) -> bool {
        self.expect_slot_mut(key);
        if self.finalizers.contains_key(&key) {
            return false;
        }
        if !self.fits(FINALIZER_NODE_SIZE) {
            self.last_allocation_result = AllocationResult::HitLimit;
            return false;
        }
        self.finalizers.insert(key, finalizer);
        self.object_bytes += FINALIZER_NODE_SIZE;
        true
    }

    fn drop_finalizer(&mut self, key: HeapRef) -> bool {
        if self.finalizers.remove(&key).is_some() {
            self.object_bytes -= FINALIZER_NODE_SIZE;
            true
        } else {
            false
        }
    }

    fn live_slot_mut(&mut self, r: HeapRef) -> Option<&mut Slot> {
        self.slots
            .get_mut(r.index as usize)
            .filter(|slot| slot.generation == r.generation && slot.object.is_some())
    }

    fn expect_slot_mut(&mut self, r: HeapRef) -> &mut Slot {
        match self.live_slot_mut(r) {
            Some(slot) => slot,
            None => panic!("stale heap reference {:?}", r),
        }
    }

    fn reclaim(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        let Some(object) = slot.object.take() else {
            return;
        };
        slot.rooted = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);

        self.objects -= 1;
        self.object_bytes -= object.accounted_size();
        self.unregister_external_allocation(object.external_len());
        if self.task.map_or(false, |t| t.index == index) {
            self.task = None;
        }
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new(HeapConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_array(len: usize) -> HeapObject {
        HeapObject::ByteArray(Payload::Inline(vec![0; len]))
    }

    fn lambda() -> HeapObject {
        HeapObject::Instance { class_id: 1 }
    }

    #[test]
    fn test_scavenge_reclaims_released_objects() {
        let mut heap = ObjectHeap::default();
        let kept = heap.allocate(byte_array(10)).unwrap();
        let dropped = heap.allocate(byte_array(20)).unwrap();
        heap.release(dropped);

        assert_eq!(heap.scavenge(), 1);
        assert!(heap.is_live(kept));
        assert!(!heap.is_live(dropped));
        assert_eq!(heap.object_count(), 1);
        assert_eq!(heap.object_bytes(), OBJECT_HEADER_SIZE + 10);
        assert_eq!(heap.gc_count(), 1);
    }

    #[test]
    fn test_lambda_finalizer_is_queued_once() {
        let mut heap = ObjectHeap::default();
        let key = heap.allocate(byte_array(4)).unwrap();
        let finalizer = heap.allocate(lambda()).unwrap();
        assert!(heap.add_finalizer(key, finalizer));
        assert!(heap.has_finalizer(key, finalizer));
        assert!(!heap.add_finalizer(key, finalizer));

        heap.release(key);
        heap.release(finalizer);
        // Key survives the first cycle, its lambda gets queued.
        assert_eq!(heap.scavenge(), 0);
        assert!(heap.is_live(key));
        assert!(!heap.has_finalizer(key, finalizer));

        assert_eq!(heap.next_finalizer_to_run(), Some(finalizer));
        assert_eq!(heap.next_finalizer_to_run(), None);

        // Second cycle reclaims the key; the lambda is rooted by the runner.
        assert_eq!(heap.scavenge(), 1);
        assert!(heap.is_live(finalizer));
    }

    #[test]
    fn test_vm_finalizer_unregisters_external_payload() {
        let mut heap = ObjectHeap::default();
        let r = heap.allocate(HeapObject::ByteArray(Payload::Inline(Vec::new()))).unwrap();
        heap.register_external_allocation(4096);
        heap.attach_external(r, vec![1; 4096]);
        assert!(heap.add_vm_finalizer(r));
        assert_eq!(heap.external_bytes(), 4096);

        heap.release(r);
        assert_eq!(heap.scavenge(), 1);
        assert_eq!(heap.external_bytes(), 0);
    }

    #[test]
    fn test_hard_limit_rejects_allocation() {
        let mut heap = ObjectHeap::new(HeapConfig::default().with_max_heap_size(100));
        heap.allocate(byte_array(50)).unwrap();
        let err = heap.allocate(byte_array(50)).unwrap_err();

        assert!(matches!(err, MemoryError::HitLimit { .. }));
        assert_eq!(heap.last_allocation_result(), AllocationResult::HitLimit);
    }

    #[test]
    fn test_finalizer_registration_fails_when_heap_exhausted() {
        let limit = OBJECT_HEADER_SIZE + FINALIZER_NODE_SIZE - 1;
        let mut heap = ObjectHeap::new(HeapConfig::default().with_max_heap_size(limit));
        let key = heap.allocate(byte_array(0)).unwrap();

        assert!(!heap.add_vm_finalizer(key));
        assert_eq!(heap.last_allocation_result(), AllocationResult::HitLimit);
    }

    #[test]
    fn test_soft_limit_admission() {
        let mut heap = ObjectHeap::new(HeapConfig::default().with_external_limit(1000));
        assert!(!heap.should_allow_external_allocation(1500));
        assert!(heap.should_allow_external_allocation(500));
        heap.register_external_allocation(800);
        assert!(!heap.should_allow_external_allocation(500));
        assert!(heap.should_allow_external_allocation(200));
    }

    #[test]
    fn test_task_is_a_root() {
        let mut heap = ObjectHeap::default();
        let task = heap.allocate(lambda()).unwrap();
        heap.set_task(Some(task));
        heap.release(task);

        assert_eq!(heap.scavenge(), 0);
        assert_eq!(heap.task(), Some(task));
    }

    #[test]
    fn test_number_of_blocks() {
        let mut heap = ObjectHeap::default();
        assert_eq!(heap.number_of_blocks(), 1);
        heap.allocate(byte_array(crate::core::limits::BLOCK_SIZE)).unwrap();
        assert_eq!(heap.number_of_blocks(), 2);
    }

    #[test]
    #[should_panic(expected = "stale heap reference")]
    fn test_stale_reference_is_fatal() {
        let mut heap = ObjectHeap::default();
        let r = heap.allocate(byte_array(1)).unwrap();
        heap.discard(r);
        heap.remove_finalizer(r);
    }
}
