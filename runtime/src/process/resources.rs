/*!
 * Resource Groups
 * Per-process native resources, torn down after the task stopped
 */

use super::process::Process;
use crate::memory::AllocationManager;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// Resource cleanup statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub resources_freed: usize,
    pub bytes_freed: usize,
    pub errors_encountered: usize,
    pub cleanup_duration_micros: u64,
    pub by_type: HashMap<String, usize>,
}

impl CleanupStats {
    /// Run `f` and record how long it took
    #[inline]
    pub fn with_timing<F>(f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        let start = Instant::now();
        let mut stats = f();
        stats.cleanup_duration_micros = start.elapsed().as_micros() as u64;
        stats
    }

    /// Merge another stats into this one
    pub fn merge(&mut self, other: CleanupStats) {
        self.resources_freed += other.resources_freed;
        self.bytes_freed += other.bytes_freed;
        self.errors_encountered += other.errors_encountered;
        self.cleanup_duration_micros += other.cleanup_duration_micros;

        for (type_name, count) in other.by_type {
            *self.by_type.entry(type_name).or_insert(0) += count;
        }
    }
}

/// Native resources owned by a process
///
/// Added and removed by the owning task only; torn down in reverse
/// registration order when the process is reaped.
pub trait ResourceGroup: Send + Sync {
    /// Resource type name for logging
    fn resource_type(&self) -> &'static str;

    /// Release everything the group holds on behalf of `process`
    fn tear_down(&self, process: &Process) -> CleanupStats;
}

/// External buffers whose lifetime is tied to the process, not to a heap
/// object
#[derive(Debug, Default)]
pub struct ExternalBufferGroup {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl ExternalBufferGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over the manager's allocation; returns the index of the buffer
    pub fn adopt(&self, manager: &mut AllocationManager<'_>) -> Option<usize> {
        let buffer = manager.keep_result()?;
        let mut buffers = self.buffers.lock();
        buffers.push(buffer);
        Some(buffers.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.lock().is_empty()
    }

    /// Bytes currently held
    pub fn held_bytes(&self) -> usize {
        self.buffers.lock().iter().map(Vec::len).sum()
    }
}

impl ResourceGroup for ExternalBufferGroup {
    fn resource_type(&self) -> &'static str {
        "external_buffers"
    }

    fn tear_down(&self, process: &Process) -> CleanupStats {
        let buffers = std::mem::take(&mut *self.buffers.lock());
        let bytes: usize = buffers.iter().map(Vec::len).sum();
        process.unregister_external_allocation(bytes);

        CleanupStats {
            resources_freed: buffers.len(),
            bytes_freed: bytes,
            ..CleanupStats::default()
        }
    }
}
