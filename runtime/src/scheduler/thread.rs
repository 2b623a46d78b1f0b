/*!
 * Scheduler Threads
 * Handles for the OS threads that run processes
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one scheduler thread
///
/// A running process points back at the thread executing it; the pointer is
/// cleared when the process is parked.
#[derive(Debug)]
pub struct SchedulerThread {
    id: u32,
    name: String,
    runs: AtomicU64,
}

impl SchedulerThread {
    pub(crate) fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            runs: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run slices handed to this thread so far
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub(crate) fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn info(&self) -> ThreadInfo {
        ThreadInfo {
            id: self.id,
            name: self.name.clone(),
            runs: self.runs(),
        }
    }
}

impl fmt::Display for SchedulerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Serializable snapshot of a scheduler thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThreadInfo {
    pub id: u32,
    pub name: String,
    pub runs: u64,
}
