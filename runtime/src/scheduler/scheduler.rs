/*!
 * Process Scheduler
 *
 * Owns the process and group tables and the FIFO run list, and drives every
 * process state transition.
 *
 * ## Locking
 *
 * The run-list lock serializes all state transitions, so a wake-up from a
 * sender can never race a park or a suspension. Nothing inside a process
 * ever takes the run-list lock, so holding it while touching a process'
 * mailbox or heap is deadlock-free.
 */

use super::stats::{AtomicSchedulerStats, SchedulerStats};
use super::thread::SchedulerThread;
use crate::core::config::{HeapConfig, RuntimeConfig, SchedulerConfig};
use crate::core::errors::{ProcessError, SchedulerError};
use crate::core::links::SlotList;
use crate::core::types::{GroupId, Micros, Pid};
use crate::monitoring::GcSpan;
use crate::process::{
    CleanupStats, Message, ObjectNotifier, Process, ProcessBuilder, ProcessEntry, ProcessGroup,
    ProcessState, Program, RunOutcome, Signal, SystemMessage, SystemMessageType,
};
use ahash::RandomState;
use dashmap::DashMap;
use log::info;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

type RunList = SlotList<Arc<Process>>;

pub struct Scheduler {
    config: SchedulerConfig,
    heap_config: HeapConfig,
    processes: DashMap<Pid, Arc<Process>, RandomState>,
    groups: DashMap<GroupId, Arc<ProcessGroup>, RandomState>,
    run_list: Mutex<RunList>,
    threads: Mutex<Vec<Arc<SchedulerThread>>>,
    next_pid: AtomicU32,
    next_gid: AtomicU32,
    next_thread_id: AtomicU32,
    stats: AtomicSchedulerStats,
}

impl Scheduler {
    pub fn new(config: RuntimeConfig) -> Self {
        info!(
            "Scheduler initialized: threads={}, time_slice={}us, watchdog={}us",
            config.scheduler.threads, config.scheduler.time_slice_us, config.scheduler.watchdog_budget_us
        );

        Self {
            config: config.scheduler,
            heap_config: config.heap,
            processes: DashMap::with_hasher(RandomState::new()),
            groups: DashMap::with_hasher(RandomState::new()),
            run_list: Mutex::new(SlotList::new()),
            threads: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(0),
            next_gid: AtomicU32::new(0),
            next_thread_id: AtomicU32::new(0),
            stats: AtomicSchedulerStats::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a thread that will call `next_runnable`
    pub fn create_thread(&self, name: &str) -> Arc<SchedulerThread> {
        let id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let thread = Arc::new(SchedulerThread::new(id, name));
        self.threads.lock().push(Arc::clone(&thread));
        debug!(thread = %thread, "Scheduler thread registered");
        thread
    }

    pub fn threads(&self) -> Vec<Arc<SchedulerThread>> {
        self.threads.lock().clone()
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Create a process group; terminations are reported to `parent`
    pub fn new_group(
        &self,
        program: Arc<Program>,
        privileged: bool,
        parent: Option<Pid>,
    ) -> Arc<ProcessGroup> {
        let gid = self.next_gid.fetch_add(1, Ordering::Relaxed);
        let group = Arc::new(ProcessGroup::new(gid, program, privileged, parent));
        self.groups.insert(gid, Arc::clone(&group));
        group
    }

    /// Create a process in `group` and put it on the run list
    #[instrument(level = "debug", skip(self, group, entry), fields(gid = group.id()))]
    pub fn spawn(
        &self,
        group: &Arc<ProcessGroup>,
        entry: ProcessEntry,
    ) -> Result<Arc<Process>, ProcessError> {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let process = ProcessBuilder::new(pid, Arc::clone(group))
            .with_entry(entry)
            .with_heap_config(self.heap_config)
            .build()?;

        group.add(&process);
        self.groups
            .entry(group.id())
            .or_insert_with(|| Arc::clone(group));
        self.processes.insert(pid, Arc::clone(&process));
        self.stats.inc_active();

        let mut list = self.run_list.lock();
        if process.transition(ProcessState::Idle, ProcessState::Scheduled) {
            self.enqueue(&mut list, &process);
        }
        drop(list);

        info!("Spawned process {} in group {}", pid, group.id());
        Ok(process)
    }

    pub fn process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.get(&pid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn group(&self, gid: GroupId) -> Option<Arc<ProcessGroup>> {
        self.groups.get(&gid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    /// Processes waiting on the run list
    pub fn run_list_len(&self) -> usize {
        self.run_list.lock().len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }

    // =========================================================================
    // Mail and signals
    // =========================================================================

    /// Deliver `message` to `pid` and wake it
    ///
    /// Mail is accepted in every state; a process awaiting GC keeps it
    /// queued until the collection completes.
    pub fn send_message(&self, pid: Pid, message: Message) -> Result<(), SchedulerError> {
        let process = self.lookup(pid)?;
        if process.is_terminated() {
            return Err(Self::invalid_state(&process, "receive mail"));
        }

        let mut list = self.run_list.lock();
        process.send_mail(message);
        self.wake(&mut list, &process);
        Ok(())
    }

    /// Post `notifier`'s notification; `false` if it was already queued or
    /// the receiver is gone
    pub fn send_notify_message(&self, notifier: &ObjectNotifier) -> bool {
        let Some(process) = notifier.process() else {
            return false;
        };
        if process.is_terminated() {
            return false;
        }

        let mut list = self.run_list.lock();
        if !notifier.notify() {
            return false;
        }
        self.wake(&mut list, &process);
        true
    }

    /// Raise `signal` on `pid` and wake it like new mail would, so the
    /// signal is seen on the next run
    pub fn signal_process(&self, pid: Pid, signal: Signal) -> Result<(), SchedulerError> {
        let process = self.lookup(pid)?;
        process.signal(signal);

        let mut list = self.run_list.lock();
        self.wake(&mut list, &process);
        trace!(pid, signal = signal.name(), "Signal raised");
        Ok(())
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    /// Pop the next scheduled process and mark it running on `thread`
    pub fn next_runnable(&self, thread: &Arc<SchedulerThread>, now: Micros) -> Option<Arc<Process>> {
        let mut list = self.run_list.lock();
        let process = list.pop_front()?;
        process.unlink_run_list();

        let started = process.transition(ProcessState::Scheduled, ProcessState::Running);
        assert!(
            started,
            "process {} on run list in state {}",
            process.id(),
            process.state()
        );
        drop(list);

        process.set_scheduler_thread(Some(Arc::clone(thread)));
        process.set_last_run(now);
        process.set_idle_since_scavenge(false);
        thread.record_run();
        self.stats.inc_runs();
        trace!(pid = process.id(), thread = %thread, "Process running");
        Some(process)
    }

    /// Hand a running process back after a run slice
    pub fn park(
        &self,
        process: &Arc<Process>,
        outcome: RunOutcome,
        now: Micros,
    ) -> Result<(), SchedulerError> {
        let mut list = self.run_list.lock();
        if process.state() != ProcessState::Running {
            return Err(Self::invalid_state(process, "park"));
        }
        process.set_scheduler_thread(None);

        match outcome {
            RunOutcome::Yielded => {
                process.increment_unyielded_for(now - process.last_run());
                process.clear_signal(Signal::Preempt);
                process.set_state(ProcessState::Scheduled);
                self.enqueue(&mut list, process);
            }
            RunOutcome::Idle => {
                process.clear_unyielded_for();
                process.clear_signal(Signal::Preempt);
                if process.has_messages() || !process.signals().is_empty() {
                    process.set_state(ProcessState::Scheduled);
                    self.enqueue(&mut list, process);
                } else {
                    process.set_state(ProcessState::Idle);
                }
            }
            RunOutcome::AwaitingGc => {
                process.increment_unyielded_for(now - process.last_run());
                process.set_state(ProcessState::SuspendedAwaitingGc);
            }
            RunOutcome::Terminated(value) => {
                drop(list);
                self.terminate(process, value);
                return Ok(());
            }
        }

        trace!(pid = process.id(), state = %process.state(), "Process parked");
        Ok(())
    }

    /// Move an idle or scheduled process out of scheduling
    pub fn suspend(&self, pid: Pid) -> Result<(), SchedulerError> {
        let process = self.lookup(pid)?;
        let mut list = self.run_list.lock();
        if process.is_terminated() {
            return Err(Self::invalid_state(&process, "suspend"));
        }
        match process.state() {
            ProcessState::Idle => process.set_state(ProcessState::SuspendedIdle),
            ProcessState::Scheduled => {
                if let Some(handle) = process.unlink_run_list() {
                    list.remove(handle);
                }
                process.set_state(ProcessState::SuspendedScheduled);
            }
            _ => return Err(Self::invalid_state(&process, "suspend")),
        }
        debug!(pid, state = %process.state(), "Process suspended");
        Ok(())
    }

    pub fn resume(&self, pid: Pid) -> Result<(), SchedulerError> {
        let process = self.lookup(pid)?;
        let mut list = self.run_list.lock();
        match process.state() {
            ProcessState::SuspendedIdle => process.set_state(ProcessState::Idle),
            ProcessState::SuspendedScheduled => {
                process.set_state(ProcessState::Scheduled);
                self.enqueue(&mut list, &process);
            }
            _ => return Err(Self::invalid_state(&process, "resume")),
        }
        debug!(pid, state = %process.state(), "Process resumed");
        Ok(())
    }

    /// Finish the collection a process was waiting for and reschedule it
    ///
    /// Runs the process' scavenge first when `scavenge` is set; returns the
    /// number of objects freed.
    pub fn gc_completed(&self, pid: Pid, scavenge: bool) -> Result<usize, SchedulerError> {
        let process = self.lookup(pid)?;
        if process.state() != ProcessState::SuspendedAwaitingGc {
            return Err(Self::invalid_state(&process, "complete gc"));
        }

        let freed = if scavenge {
            let span = GcSpan::new(pid, "allocation failure");
            let _entered = span.enter();
            let freed = process.scavenge();
            span.record_freed(freed);
            freed
        } else {
            0
        };

        let mut list = self.run_list.lock();
        if process.transition(ProcessState::SuspendedAwaitingGc, ProcessState::Scheduled) {
            self.enqueue(&mut list, &process);
        }
        debug!(pid, freed, "GC completed");
        Ok(freed)
    }

    /// Scavenge idle processes that ran since their last scavenge
    pub fn scavenge_idle(&self) -> usize {
        let idle: Vec<Arc<Process>> = self
            .processes
            .iter()
            .filter(|entry| {
                let p = entry.value();
                p.state() == ProcessState::Idle && !p.is_terminated() && !p.idle_since_scavenge()
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut freed = 0;
        for process in &idle {
            let span = GcSpan::new(process.id(), "idle");
            let count = {
                let _entered = span.enter();
                process.scavenge()
            };
            span.record_freed(count);
            freed += count;
            process.set_idle_since_scavenge(true);
        }
        if !idle.is_empty() {
            debug!(processes = idle.len(), freed, "Scavenged idle processes");
        }
        freed
    }

    /// Raise `PREEMPT` on processes past their slice and `WATCHDOG` on
    /// those past the watchdog budget; returns how many were signalled
    pub fn tick(&self, now: Micros) -> usize {
        let running: Vec<Arc<Process>> = self
            .processes
            .iter()
            .filter(|entry| entry.value().state() == ProcessState::Running)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut signalled = 0;
        for process in running {
            let duration = process.current_run_duration(now);
            if duration >= self.config.watchdog_budget_us {
                if !process.signals().contains(Signal::Watchdog) {
                    warn!(pid = process.id(), duration_us = duration, "Watchdog fired");
                    self.stats.inc_watchdog_fires();
                }
                process.signal(Signal::Watchdog);
                signalled += 1;
            } else if now - process.last_run() >= self.config.time_slice_us {
                process.signal(Signal::Preempt);
                self.stats.inc_preemptions();
                signalled += 1;
            }
        }
        signalled
    }

    // =========================================================================
    // Termination
    // =========================================================================

    fn terminate(&self, process: &Arc<Process>, value: i64) {
        {
            let _list = self.run_list.lock();
            if !process.mark_terminated(value) {
                return;
            }
            process.clear_unyielded_for();
            process.set_state(ProcessState::Idle);
        }
        self.stats.inc_terminated();

        let group = process.group();
        info!(
            "Process {} in group {} terminated with {}",
            process.id(),
            group.id(),
            value
        );

        let Some(parent) = group.parent() else {
            return;
        };
        let message = SystemMessage::new(
            SystemMessageType::Terminated,
            group.id(),
            process.id(),
            value.to_le_bytes().to_vec(),
        );
        if let Err(e) = self.send_message(parent, Message::System(message)) {
            warn!(pid = process.id(), parent, error = %e, "Could not report termination");
        }
    }

    /// Remove a terminated process and release everything it owns
    #[instrument(level = "debug", skip(self))]
    pub fn reap(&self, pid: Pid) -> Result<CleanupStats, SchedulerError> {
        let process = self.lookup(pid)?;
        if !process.is_terminated() {
            return Err(SchedulerError::NotTerminated(pid));
        }
        self.processes.remove(&pid);
        self.stats.dec_active();

        {
            let mut list = self.run_list.lock();
            if let Some(handle) = process.unlink_run_list() {
                list.remove(handle);
            }
        }

        let group = Arc::clone(process.group());
        group.remove(&process);
        if group.is_empty() {
            self.groups.remove(&group.id());
        }

        let mut stats = CleanupStats::with_timing(|| {
            let drained = process.drain_mailbox();
            let mut stats = CleanupStats {
                resources_freed: drained,
                ..CleanupStats::default()
            };
            stats.by_type.insert("mailbox".to_string(), drained);
            stats
        });
        stats.merge(process.tear_down_resource_groups());

        info!(
            "Reaped PID {}: {} resources freed, {} bytes freed, {} errors",
            pid, stats.resources_freed, stats.bytes_freed, stats.errors_encountered
        );
        Ok(stats)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lookup(&self, pid: Pid) -> Result<Arc<Process>, SchedulerError> {
        self.process(pid).ok_or(SchedulerError::ProcessNotFound(pid))
    }

    fn enqueue(&self, list: &mut MutexGuard<'_, RunList>, process: &Arc<Process>) {
        let handle = list.push_back(Arc::clone(process));
        process.link_run_list(handle);
        self.stats.inc_scheduled();
    }

    /// New mail, a notification or a signal arrived
    fn wake(&self, list: &mut MutexGuard<'_, RunList>, process: &Arc<Process>) {
        if process.is_terminated() {
            return;
        }
        match process.state() {
            ProcessState::Idle => {
                process.set_state(ProcessState::Scheduled);
                self.enqueue(list, process);
            }
            ProcessState::SuspendedIdle => process.set_state(ProcessState::SuspendedScheduled),
            _ => {}
        }
    }

    fn invalid_state(process: &Process, operation: &str) -> SchedulerError {
        SchedulerError::InvalidState {
            pid: process.id(),
            state: process.state().to_string(),
            operation: operation.to_string(),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
