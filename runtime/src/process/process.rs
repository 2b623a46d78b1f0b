/*!
 * Process
 *
 * One isolated VM process: a private object heap, a mailbox, a signal mask
 * and the bookkeeping the scheduler and the collector need.
 *
 * ## Sharing
 *
 * A process is shared as `Arc<Process>` between the scheduler tables, its
 * group and any thread posting mail. Everything touched from other threads
 * is atomic (state, signals, counters) or behind a short `parking_lot`
 * lock (mailbox, heap). The heap lock is never held while calling into an
 * `AllocationManager`, which re-enters it for accounting.
 */

use super::mailbox::Mailbox;
use super::message::Message;
use super::group::ProcessGroup;
#[cfg(feature = "profiler")]
use super::profiler::Profiler;
use super::program::{Method, Program};
use super::random::Xorshift;
use super::resources::{CleanupStats, ResourceGroup};
use super::types::{ProcessEntry, ProcessState, Signal, SignalSet};
use crate::core::config::HeapConfig;
use crate::core::errors::ProcessError;
use crate::core::limits::{CURRENT_DIRECTORY_UNSET, MAX_INTERNAL_PAYLOAD, MAX_PAYLOAD_LENGTH};
use crate::core::links::SlotHandle;
use crate::core::types::{Fd, Micros, Pid, Size, TaskId, Word};
use crate::memory::{
    AllocationManager, AllocationResult, ErrorObject, ExternalMemory, HeapObject, HeapRef,
    Object, ObjectHeap, Payload, Usage,
};
use crate::scheduler::SchedulerThread;
use arc_swap::ArcSwapOption;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{
    AtomicBool, AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering,
};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Class id of the initial task object
const TASK_CLASS_ID: u32 = 0;

pub struct Process {
    id: Pid,
    next_task_id: AtomicU32,
    program: Arc<Program>,
    group: Arc<ProcessGroup>,
    entry: ProcessEntry,

    heap: Mutex<ObjectHeap>,
    memory_usage: Mutex<Usage>,
    last_bytes_allocated: AtomicU64,
    idle_since_scavenge: AtomicBool,

    mailbox: Mailbox,
    signals: AtomicU32,
    state: AtomicU8,
    exit_value: OnceLock<i64>,

    random: Mutex<Xorshift>,
    current_directory: AtomicI32,

    scheduler_thread: ArcSwapOption<SchedulerThread>,
    last_run_us: AtomicI64,
    unyielded_for_us: AtomicI64,

    #[cfg(feature = "profiler")]
    profiler: Mutex<Option<Arc<Profiler>>>,

    resource_groups: Mutex<Vec<Arc<dyn ResourceGroup>>>,

    // Membership in the group list and the scheduler run list
    group_link: Mutex<Option<SlotHandle>>,
    run_link: Mutex<Option<SlotHandle>>,
}

impl Process {
    /// Create a process and its initial task object
    ///
    /// Fails when the heap cannot hold the initial task.
    pub(crate) fn new(
        id: Pid,
        program: Arc<Program>,
        group: Arc<ProcessGroup>,
        entry: ProcessEntry,
        heap_config: HeapConfig,
    ) -> Result<Self, ProcessError> {
        let mut heap = ObjectHeap::new(heap_config);
        let task = heap
            .allocate(HeapObject::Instance {
                class_id: TASK_CLASS_ID,
            })
            .map_err(|e| ProcessError::CreationFailed(e.to_string()))?;
        heap.set_task(Some(task));
        let usage = heap.usage("object heap at creation");

        Ok(Self {
            id,
            next_task_id: AtomicU32::new(0),
            program,
            group,
            entry,
            heap: Mutex::new(heap),
            memory_usage: Mutex::new(usage),
            last_bytes_allocated: AtomicU64::new(0),
            idle_since_scavenge: AtomicBool::new(false),
            mailbox: Mailbox::new(),
            signals: AtomicU32::new(0),
            state: AtomicU8::new(ProcessState::Idle as u8),
            exit_value: OnceLock::new(),
            random: Mutex::new(Xorshift::new()),
            current_directory: AtomicI32::new(CURRENT_DIRECTORY_UNSET),
            scheduler_thread: ArcSwapOption::empty(),
            last_run_us: AtomicI64::new(0),
            unyielded_for_us: AtomicI64::new(0),
            #[cfg(feature = "profiler")]
            profiler: Mutex::new(None),
            resource_groups: Mutex::new(Vec::new()),
            group_link: Mutex::new(None),
            run_link: Mutex::new(None),
        })
    }

    // =========================================================================
    // Identity
    // =========================================================================

    #[inline]
    pub fn id(&self) -> Pid {
        self.id
    }

    /// Next task id of this process; starts at 0
    pub fn next_task_id(&self) -> TaskId {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    #[inline]
    pub fn group(&self) -> &Arc<ProcessGroup> {
        &self.group
    }

    pub fn is_privileged(&self) -> bool {
        self.group.is_privileged()
    }

    #[inline]
    pub fn entry(&self) -> &ProcessEntry {
        &self.entry
    }

    /// Method the interpreter starts in
    pub fn entry_method(&self) -> Method {
        match &self.entry {
            ProcessEntry::Spawn { method, .. } => *method,
            ProcessEntry::Main { .. } | ProcessEntry::Snapshot { .. } => {
                self.program.entry_main()
            }
        }
    }

    /// Command-line style arguments; empty for spawned methods
    pub fn args(&self) -> &[String] {
        match &self.entry {
            ProcessEntry::Main { args } | ProcessEntry::Snapshot { args, .. } => args,
            ProcessEntry::Spawn { .. } => &[],
        }
    }

    /// Encoded arguments of a spawned method
    pub fn spawn_arguments(&self) -> Option<&[u8]> {
        match &self.entry {
            ProcessEntry::Spawn { arguments, .. } => Some(arguments),
            _ => None,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[inline]
    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; `false` if the state was not `from`
    pub(crate) fn transition(&self, from: ProcessState, to: ProcessState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.state().is_suspended()
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.exit_value.get().is_some()
    }

    pub fn exit_value(&self) -> Option<i64> {
        self.exit_value.get().copied()
    }

    /// Record the exit value; `false` if the process already terminated
    pub(crate) fn mark_terminated(&self, value: i64) -> bool {
        self.exit_value.set(value).is_ok()
    }

    pub fn scheduler_thread(&self) -> Option<Arc<SchedulerThread>> {
        self.scheduler_thread.load_full()
    }

    pub fn set_scheduler_thread(&self, thread: Option<Arc<SchedulerThread>>) {
        self.scheduler_thread.store(thread);
    }

    // =========================================================================
    // Signals
    // =========================================================================

    pub fn signal(&self, signal: Signal) {
        self.signals.fetch_or(signal.bit(), Ordering::AcqRel);
    }

    pub fn clear_signal(&self, signal: Signal) {
        self.signals.fetch_and(!signal.bit(), Ordering::AcqRel);
    }

    #[inline]
    pub fn signals(&self) -> SignalSet {
        SignalSet::from_bits(self.signals.load(Ordering::Acquire))
    }

    // =========================================================================
    // Mailbox
    // =========================================================================

    /// Enqueue at the tail; safe from any thread
    ///
    /// Only enqueues. Waking the process is the scheduler's job.
    pub fn send_mail(&self, message: Message) {
        trace!(pid = self.id, kind = ?message.message_type(), "Mail queued");
        self.mailbox.post(message);
    }

    #[inline]
    pub fn has_messages(&self) -> bool {
        !self.mailbox.is_empty()
    }

    #[inline]
    pub fn message_count(&self) -> usize {
        self.mailbox.len()
    }

    /// Head of the mailbox, mutable so a system message's payload can be
    /// taken. Senders block while the guard is alive.
    pub fn peek_message(&self) -> Option<MappedMutexGuard<'_, Message>> {
        self.mailbox.peek()
    }

    /// Pop the head; `false` if the mailbox was empty
    pub fn remove_first_message(&self) -> bool {
        self.mailbox.remove_first().is_some()
    }

    /// Drop all queued mail; returns how many messages were released
    pub(crate) fn drain_mailbox(&self) -> usize {
        self.mailbox.drain()
    }

    // =========================================================================
    // Heap and GC surface
    // =========================================================================

    /// Exclusive access to the object heap
    ///
    /// Do not hold the guard across the allocation helpers or an
    /// `AllocationManager`: both lock the heap themselves.
    pub fn object_heap(&self) -> MutexGuard<'_, ObjectHeap> {
        self.heap.lock()
    }

    /// Collect garbage and refresh the cached usage; returns objects freed
    pub fn scavenge(&self) -> usize {
        let mut heap = self.heap.lock();
        let freed = heap.scavenge();
        *self.memory_usage.lock() = heap.usage("object heap after gc");
        freed
    }

    /// Usage snapshot taken by the last scavenge
    pub fn usage(&self) -> Usage {
        self.memory_usage.lock().clone()
    }

    pub fn idle_since_scavenge(&self) -> bool {
        self.idle_since_scavenge.load(Ordering::Acquire)
    }

    pub fn set_idle_since_scavenge(&self, value: bool) {
        self.idle_since_scavenge.store(value, Ordering::Release);
    }

    pub fn has_finalizer(&self, key: HeapRef, lambda: HeapRef) -> bool {
        self.heap.lock().has_finalizer(key, lambda)
    }

    pub fn add_finalizer(&self, key: HeapRef, lambda: HeapRef) -> bool {
        self.heap.lock().add_finalizer(key, lambda)
    }

    pub fn add_vm_finalizer(&self, key: HeapRef) -> bool {
        self.heap.lock().add_vm_finalizer(key)
    }

    pub fn remove_finalizer(&self, key: HeapRef) -> bool {
        self.heap.lock().remove_finalizer(key)
    }

    pub fn next_finalizer_to_run(&self) -> Option<HeapRef> {
        self.heap.lock().next_finalizer_to_run()
    }

    pub fn gc_count(&self) -> usize {
        self.heap.lock().gc_count()
    }

    pub fn number_of_blocks(&self) -> usize {
        self.heap.lock().number_of_blocks()
    }

    pub fn set_max_heap_size(&self, bytes: Option<Size>) {
        self.heap.lock().set_max_heap_size(bytes);
    }

    pub fn task(&self) -> Option<HeapRef> {
        self.heap.lock().task()
    }

    pub fn set_task(&self, task: Option<HeapRef>) {
        self.heap.lock().set_task(task);
    }

    /// Bytes allocated since the previous call
    pub fn bytes_allocated_delta(&self) -> i64 {
        let current = self.heap.lock().total_bytes_allocated();
        let previous = self.last_bytes_allocated.swap(current, Ordering::AcqRel);
        current as i64 - previous as i64
    }

    // =========================================================================
    // External memory accounting
    // =========================================================================

    /// Admission check; records the outcome as the last allocation result
    pub fn should_allow_external_allocation(&self, size: Size) -> bool {
        let mut heap = self.heap.lock();
        let allowed = heap.should_allow_external_allocation(size);
        heap.set_last_allocation_result(if allowed {
            AllocationResult::Success
        } else {
            AllocationResult::HitLimit
        });
        allowed
    }

    pub fn system_refused_memory(&self) -> bool {
        self.heap.lock().system_refused_memory()
    }

    pub fn last_allocation_result(&self) -> AllocationResult {
        self.heap.lock().last_allocation_result()
    }

    pub fn register_external_allocation(&self, size: Size) {
        self.heap.lock().register_external_allocation(size);
    }

    pub fn unregister_external_allocation(&self, size: Size) {
        self.heap.lock().unregister_external_allocation(size);
    }

    pub fn external_bytes(&self) -> Size {
        self.heap.lock().external_bytes()
    }

    // =========================================================================
    // Allocation helpers
    // =========================================================================

    pub fn allocate_string(&self, content: &str) -> Result<HeapRef, ErrorObject> {
        self.allocate_payload(content.len(), false, HeapObject::String, |buffer| {
            buffer.copy_from_slice(content.as_bytes())
        })
    }

    /// String of `length` zero bytes, to be filled in by the caller
    pub fn allocate_string_of_length(&self, length: Word) -> Result<HeapRef, ErrorObject> {
        let length = Self::checked_length(length)?;
        self.allocate_payload(length, false, HeapObject::String, |_| {})
    }

    pub fn allocate_string_or_error(&self, content: &str) -> Object {
        Object::from(self.allocate_string(content))
    }

    /// Zeroed byte array; external when large or when `force_external`
    pub fn allocate_byte_array(
        &self,
        length: Word,
        force_external: bool,
    ) -> Result<HeapRef, ErrorObject> {
        let length = Self::checked_length(length)?;
        self.allocate_payload(length, force_external, HeapObject::ByteArray, |_| {})
    }

    fn checked_length(length: Word) -> Result<Size, ErrorObject> {
        match usize::try_from(length) {
            Err(_) => Err(ErrorObject::InvalidArgument),
            Ok(length) if length > MAX_PAYLOAD_LENGTH => Err(ErrorObject::OutOfMemory),
            Ok(length) => Ok(length),
        }
    }

    fn allocate_payload<F>(
        &self,
        length: Size,
        force_external: bool,
        make: fn(Payload) -> HeapObject,
        fill: F,
    ) -> Result<HeapRef, ErrorObject>
    where
        F: FnOnce(&mut [u8]),
    {
        if !force_external && length <= MAX_INTERNAL_PAYLOAD {
            let mut bytes = vec![0; length];
            fill(&mut bytes);
            return self
                .heap
                .lock()
                .allocate(make(Payload::Inline(bytes)))
                .map_err(ErrorObject::from);
        }

        let mut manager = AllocationManager::new(self);
        let Some(buffer) = manager.alloc(length) else {
            debug!(
                pid = self.id,
                length,
                hit_limit = manager.hit_limit(),
                "External payload allocation failed"
            );
            return Err(ErrorObject::OutOfMemory);
        };
        fill(buffer);

        // Declared after `manager`, so released first on early return.
        let mut heap = self.heap.lock();
        let r = heap.allocate(make(Payload::Inline(Vec::new())))?;
        if !heap.add_vm_finalizer(r) {
            heap.discard(r);
            return Err(ErrorObject::OutOfMemory);
        }
        if let Some(buffer) = manager.keep_result() {
            heap.attach_external(r, buffer);
        }
        Ok(r)
    }

    // =========================================================================
    // Miscellaneous process state
    // =========================================================================

    pub fn random(&self) -> u64 {
        self.random.lock().next_u64()
    }

    /// Seed `random` from the first 16 bytes of `seed`, zero-padded
    pub fn random_seed(&self, seed: &[u8]) {
        self.random.lock().seed(seed);
    }

    #[inline]
    pub fn current_directory(&self) -> Fd {
        self.current_directory.load(Ordering::Acquire)
    }

    pub fn set_current_directory(&self, fd: Fd) {
        self.current_directory.store(fd, Ordering::Release);
    }

    /// When the current run slice started
    pub fn last_run(&self) -> Micros {
        self.last_run_us.load(Ordering::Acquire)
    }

    pub fn set_last_run(&self, us: Micros) {
        self.last_run_us.store(us, Ordering::Release);
    }

    pub fn increment_unyielded_for(&self, us: Micros) {
        self.unyielded_for_us.fetch_add(us, Ordering::AcqRel);
    }

    pub fn clear_unyielded_for(&self) {
        self.unyielded_for_us.store(0, Ordering::Release);
    }

    /// Run time since the process last yielded, as of `now`
    pub fn current_run_duration(&self, now: Micros) -> Micros {
        self.unyielded_for_us.load(Ordering::Acquire)
            + (now - self.last_run_us.load(Ordering::Acquire))
    }

    // =========================================================================
    // Profiler
    // =========================================================================

    /// Install a profiler for `task_id`; returns the bytes it holds
    #[cfg(feature = "profiler")]
    pub fn install_profiler(&self, task_id: TaskId) -> Result<usize, ProcessError> {
        let mut slot = self.profiler.lock();
        if slot.is_some() {
            return Err(ProcessError::ProfilerInstalled(self.id));
        }
        let profiler = Arc::new(Profiler::new(task_id));
        let bytes = profiler.allocated_bytes();
        *slot = Some(profiler);
        info!(pid = self.id, task_id, bytes, "Profiler installed");
        Ok(bytes)
    }

    #[cfg(feature = "profiler")]
    pub fn profiler(&self) -> Option<Arc<Profiler>> {
        self.profiler.lock().clone()
    }

    #[cfg(feature = "profiler")]
    pub fn uninstall_profiler(&self) -> Option<Arc<Profiler>> {
        self.profiler.lock().take()
    }

    // =========================================================================
    // Resource groups
    // =========================================================================

    pub fn add_resource_group(&self, group: Arc<dyn ResourceGroup>) {
        self.resource_groups.lock().push(group);
    }

    /// # Panics
    /// If `group` is not registered with this process.
    pub fn remove_resource_group(&self, group: &Arc<dyn ResourceGroup>) {
        let mut groups = self.resource_groups.lock();
        let Some(index) = groups.iter().position(|g| Arc::ptr_eq(g, group)) else {
            panic!(
                "resource group {} is not registered with process {}",
                group.resource_type(),
                self.id
            );
        };
        groups.remove(index);
    }

    pub fn resource_group_count(&self) -> usize {
        self.resource_groups.lock().len()
    }

    /// Tear down every resource group, newest first
    pub(crate) fn tear_down_resource_groups(&self) -> CleanupStats {
        let overall_start = Instant::now();
        let groups = std::mem::take(&mut *self.resource_groups.lock());
        let mut total = CleanupStats::default();

        for group in groups.iter().rev() {
            let resource_type = group.resource_type();
            let mut stats = CleanupStats::with_timing(|| group.tear_down(self));
            stats
                .by_type
                .insert(resource_type.to_string(), stats.resources_freed);

            if stats.errors_encountered > 0 {
                warn!(
                    pid = self.id,
                    resource_type,
                    errors = stats.errors_encountered,
                    "Errors during resource teardown"
                );
            }
            log::info!(
                "Cleaned {} resources for PID {} (type: {}, took {}μs)",
                stats.resources_freed,
                self.id,
                resource_type,
                stats.cleanup_duration_micros
            );
            total.merge(stats);
        }

        total.cleanup_duration_micros = overall_start.elapsed().as_micros() as u64;
        total
    }

    // =========================================================================
    // List membership
    // =========================================================================

    pub(crate) fn link_group(&self, handle: SlotHandle) {
        let mut link = self.group_link.lock();
        assert!(
            link.is_none(),
            "process {} is already in a process group",
            self.id
        );
        *link = Some(handle);
    }

    pub(crate) fn unlink_group(&self) -> Option<SlotHandle> {
        self.group_link.lock().take()
    }

    pub(crate) fn link_run_list(&self, handle: SlotHandle) {
        let mut link = self.run_link.lock();
        assert!(
            link.is_none(),
            "process {} is already on a run list",
            self.id
        );
        *link = Some(handle);
    }

    pub(crate) fn unlink_run_list(&self) -> Option<SlotHandle> {
        self.run_link.lock().take()
    }

    pub fn is_in_group(&self) -> bool {
        self.group_link.lock().is_some()
    }

    pub fn is_on_run_list(&self) -> bool {
        self.run_link.lock().is_some()
    }

    /// Log a one-line description
    pub fn print(&self) {
        info!("{}", self);
    }
}

impl ExternalMemory for Process {
    fn owner(&self) -> Pid {
        self.id
    }

    fn should_allow_external_allocation(&self, size: Size) -> bool {
        Process::should_allow_external_allocation(self, size)
    }

    fn register_external_allocation(&self, size: Size) {
        Process::register_external_allocation(self, size);
    }

    fn unregister_external_allocation(&self, size: Size) {
        Process::unregister_external_allocation(self, size);
    }

    fn set_last_allocation_result(&self, result: AllocationResult) {
        self.heap.lock().set_last_allocation_result(result);
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Process #{} [program: {}, group: {}] state: {} signals: {} messages: {}",
            self.id,
            self.program.name(),
            self.group.id(),
            self.state(),
            self.signals(),
            self.message_count()
        )
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("program", &self.program.name())
            .field("group", &self.group.id())
            .field("state", &self.state())
            .field("signals", &self.signals())
            .field("messages", &self.message_count())
            .field("exit_value", &self.exit_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::message::{SystemMessage, SystemMessageType};
    use crate::process::resources::ExternalBufferGroup;

    fn process_with(config: HeapConfig) -> Process {
        let program = Program::new("test", Method(0));
        let group = Arc::new(ProcessGroup::new(1, Arc::clone(&program), false, None));
        Process::new(7, program, group, ProcessEntry::Main { args: vec![] }, config).unwrap()
    }

    fn process() -> Process {
        process_with(HeapConfig::default())
    }

    #[test]
    fn test_initial_state() {
        let p = process();
        assert_eq!(p.state(), ProcessState::Idle);
        assert_eq!(p.current_directory(), -1);
        assert!(p.signals().is_empty());
        assert!(p.task().is_some());
        assert!(!p.is_terminated());
        assert_eq!(p.next_task_id(), 0);
        assert_eq!(p.next_task_id(), 1);
    }

    #[test]
    fn test_signals_set_and_clear_independently() {
        let p = process();
        p.signal(Signal::Kill);
        p.signal(Signal::Preempt);
        p.clear_signal(Signal::Preempt);

        assert!(p.signals().contains(Signal::Kill));
        assert!(!p.signals().contains(Signal::Preempt));
    }

    #[test]
    fn test_soft_limit_scenario() {
        let p = process_with(HeapConfig::default().with_external_limit(1000));

        assert!(!p.should_allow_external_allocation(1500));
        assert_eq!(p.last_allocation_result(), AllocationResult::HitLimit);
        assert!(p.should_allow_external_allocation(500));
        assert_eq!(p.last_allocation_result(), AllocationResult::Success);
    }

    #[test]
    fn test_invalid_lengths() {
        let p = process();
        assert_eq!(p.allocate_byte_array(-1, false), Err(ErrorObject::InvalidArgument));
        assert_eq!(
            p.allocate_string_of_length((MAX_PAYLOAD_LENGTH + 1) as Word),
            Err(ErrorObject::OutOfMemory)
        );
    }

    #[test]
    fn test_large_byte_array_is_external() {
        let p = process();
        let r = p.allocate_byte_array(4096, false).unwrap();
        assert_eq!(p.external_bytes(), 4096);
        {
            let heap = p.object_heap();
            assert!(heap.get(r).payload().unwrap().is_external());
        }

        p.object_heap().release(r);
        p.scavenge();
        assert_eq!(p.external_bytes(), 0);
    }

    #[test]
    fn test_forced_external_small_array() {
        let p = process();
        let r = p.allocate_byte_array(8, true).unwrap();
        assert_eq!(p.external_bytes(), 8);
        assert_eq!(p.object_heap().get(r).as_bytes(), Some(&[0u8; 8][..]));
    }

    #[test]
    fn test_string_or_error() {
        let p = process_with(HeapConfig::default().with_external_limit(10));
        let small = p.allocate_string_or_error("hello");
        assert!(!small.is_error());
        let r = small.heap_ref().unwrap();
        assert_eq!(p.object_heap().get(r).as_str(), Some("hello"));

        let large = "x".repeat(MAX_INTERNAL_PAYLOAD + 1);
        assert_eq!(
            p.allocate_string_or_error(&large),
            Object::Error(ErrorObject::OutOfMemory)
        );
        assert_eq!(p.external_bytes(), 0);
    }

    #[test]
    fn test_remove_first_message() {
        let p = process();
        p.send_mail(Message::System(SystemMessage::empty(SystemMessageType::Log, 1, 2)));
        assert!(p.has_messages());
        assert!(p.remove_first_message());
        assert!(!p.remove_first_message());
        assert_eq!(p.message_count(), 0);
    }

    #[test]
    fn test_resource_group_teardown() {
        let p = process();
        let buffers = Arc::new(ExternalBufferGroup::new());
        {
            let mut manager = AllocationManager::new(&p);
            manager.alloc(64).unwrap();
            buffers.adopt(&mut manager);
        }
        assert_eq!(p.external_bytes(), 64);

        p.add_resource_group(buffers);
        let stats = p.tear_down_resource_groups();
        assert_eq!(stats.bytes_freed, 64);
        assert_eq!(stats.by_type.get("external_buffers"), Some(&1));
        assert_eq!(p.external_bytes(), 0);
        assert_eq!(p.resource_group_count(), 0);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_double_remove_resource_group_is_fatal() {
        let p = process();
        let group: Arc<dyn ResourceGroup> = Arc::new(ExternalBufferGroup::new());
        p.add_resource_group(Arc::clone(&group));
        p.remove_resource_group(&group);
        p.remove_resource_group(&group);
    }

    #[test]
    fn test_run_duration() {
        let p = process();
        p.set_last_run(100);
        p.increment_unyielded_for(50);
        assert_eq!(p.current_run_duration(130), 80);
        p.clear_unyielded_for();
        assert_eq!(p.current_run_duration(130), 30);
    }

    #[test]
    fn test_bytes_allocated_delta() {
        let p = process();
        p.bytes_allocated_delta();
        p.allocate_byte_array(10, false).unwrap();
        assert!(p.bytes_allocated_delta() > 0);
        assert_eq!(p.bytes_allocated_delta(), 0);
    }

    #[cfg(feature = "profiler")]
    #[test]
    fn test_profiler_install_once() {
        let p = process();
        assert!(p.install_profiler(3).is_ok());
        assert_eq!(p.install_profiler(4), Err(ProcessError::ProfilerInstalled(7)));
        assert_eq!(p.uninstall_profiler().map(|p| p.task_id()), Some(3));
        assert!(p.profiler().is_none());
    }
}
