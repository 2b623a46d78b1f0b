/*!
 * Profiler
 * Per-process sampling counters for bytecode positions
 */

use super::program::Method;
use crate::core::types::TaskId;
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem::size_of;

/// Sample counters of one task
#[derive(Debug)]
pub struct Profiler {
    task_id: TaskId,
    samples: Mutex<HashMap<(Method, u32), u64, RandomState>>,
}

impl Profiler {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            samples: Mutex::new(HashMap::with_hasher(RandomState::new())),
        }
    }

    /// Task whose execution is sampled
    #[inline]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Record one sample at `bytecode_index` in `method`
    pub fn increment(&self, method: Method, bytecode_index: u32) {
        *self.samples.lock().entry((method, bytecode_index)).or_insert(0) += 1;
    }

    pub fn sample_count(&self) -> u64 {
        self.samples.lock().values().sum()
    }

    /// Hottest positions first
    pub fn report(&self) -> Vec<(Method, u32, u64)> {
        let mut rows: Vec<_> = self
            .samples
            .lock()
            .iter()
            .map(|(&(method, index), &count)| (method, index, count))
            .collect();
        rows.sort_by(|a, b| b.2.cmp(&a.2).then(a.0 .0.cmp(&b.0 .0)).then(a.1.cmp(&b.1)));
        rows
    }

    /// Bytes held by the profiler, charged to the process on install
    pub fn allocated_bytes(&self) -> usize {
        let entry = size_of::<((Method, u32), u64)>();
        size_of::<Self>() + self.samples.lock().capacity() * entry
    }
}
