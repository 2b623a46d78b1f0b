/*!
 * Lock-Free Scheduler Statistics
 * Atomic counters updated on the scheduling hot paths
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerStats {
    pub total_scheduled: u64,
    pub runs: u64,
    pub preemptions: u64,
    pub watchdog_fires: u64,
    pub terminated: u64,
    pub active_processes: usize,
}

/// Atomic scheduler statistics
///
/// Counters use relaxed ordering; a snapshot may be slightly inconsistent
/// across fields, which is fine for monitoring.
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct AtomicSchedulerStats {
    total_scheduled: AtomicU64,
    runs: AtomicU64,
    preemptions: AtomicU64,
    watchdog_fires: AtomicU64,
    terminated: AtomicU64,
    active_processes: AtomicUsize,
}

impl AtomicSchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_scheduled(&self) {
        self.total_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_runs(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_preemptions(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_watchdog_fires(&self) {
        self.watchdog_fires.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_terminated(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_active(&self) {
        self.active_processes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn dec_active(&self) {
        self.active_processes.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            total_scheduled: self.total_scheduled.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            watchdog_fires: self.watchdog_fires.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            active_processes: self.active_processes.load(Ordering::Relaxed),
        }
    }
}
