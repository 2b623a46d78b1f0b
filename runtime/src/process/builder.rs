/*!
 * Process Builder
 * Builder pattern for Process construction
 */

use super::group::ProcessGroup;
use super::process::Process;
use super::program::{Method, Program, SnapshotBundle};
use super::types::ProcessEntry;
use crate::core::config::HeapConfig;
use crate::core::errors::ProcessError;
use crate::core::types::Pid;
use std::sync::Arc;
use tracing::debug;

/// Builder for `Process`
///
/// Defaults to the program's main entry without arguments and the default
/// heap configuration.
pub struct ProcessBuilder {
    id: Pid,
    group: Arc<ProcessGroup>,
    program: Option<Arc<Program>>,
    entry: ProcessEntry,
    heap_config: HeapConfig,
}

impl ProcessBuilder {
    pub fn new(id: Pid, group: Arc<ProcessGroup>) -> Self {
        Self {
            id,
            group,
            program: None,
            entry: ProcessEntry::Main { args: Vec::new() },
            heap_config: HeapConfig::default(),
        }
    }

    /// Run a different program than the group's
    pub fn with_program(mut self, program: Arc<Program>) -> Self {
        self.program = Some(program);
        self
    }

    /// Start at the program's main entry with `args`
    pub fn with_main_args(mut self, args: Vec<String>) -> Self {
        self.entry = ProcessEntry::Main { args };
        self
    }

    /// Start from a loaded snapshot with `args`
    pub fn with_snapshot(mut self, bundle: SnapshotBundle, args: Vec<String>) -> Self {
        self.entry = ProcessEntry::Snapshot { bundle, args };
        self
    }

    /// Start at a compiled `method` with encoded `arguments`
    pub fn with_spawn(mut self, method: Method, arguments: Vec<u8>) -> Self {
        self.entry = ProcessEntry::Spawn { method, arguments };
        self
    }

    pub fn with_entry(mut self, entry: ProcessEntry) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_heap_config(mut self, config: HeapConfig) -> Self {
        self.heap_config = config;
        self
    }

    /// Build the process; it is not yet linked into its group
    pub fn build(self) -> Result<Arc<Process>, ProcessError> {
        if let ProcessEntry::Snapshot { bundle, .. } = &self.entry {
            if bundle.is_empty() {
                return Err(ProcessError::CreationFailed(format!(
                    "empty snapshot bundle for process {}",
                    self.id
                )));
            }
        }

        let program = self
            .program
            .unwrap_or_else(|| Arc::clone(self.group.program()));
        let process = Process::new(self.id, program, self.group, self.entry, self.heap_config)?;

        debug!(
            pid = process.id(),
            gid = process.group().id(),
            program = process.program().name(),
            entry = %process.entry_method(),
            "Process created"
        );
        Ok(Arc::new(process))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Arc<ProcessGroup> {
        Arc::new(ProcessGroup::new(3, Program::new("app", Method(11)), true, None))
    }

    #[test]
    fn test_defaults_to_main_entry() {
        let process = ProcessBuilder::new(1, group()).build().unwrap();
        assert_eq!(process.entry_method(), Method(11));
        assert!(process.args().is_empty());
        assert!(process.is_privileged());
    }

    #[test]
    fn test_spawn_entry() {
        let process = ProcessBuilder::new(2, group())
            .with_spawn(Method(42), vec![1, 2])
            .build()
            .unwrap();
        assert_eq!(process.entry_method(), Method(42));
        assert_eq!(process.spawn_arguments(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn test_creation_fails_without_heap_room() {
        let result = ProcessBuilder::new(3, group())
            .with_heap_config(HeapConfig::default().with_max_heap_size(1))
            .build();
        assert!(matches!(result, Err(ProcessError::CreationFailed(_))));
    }

    #[test]
    fn test_empty_snapshot_is_rejected() {
        let result = ProcessBuilder::new(4, group())
            .with_snapshot(SnapshotBundle::new(Vec::new()), vec![])
            .build();
        assert!(matches!(result, Err(ProcessError::CreationFailed(_))));
    }
}
