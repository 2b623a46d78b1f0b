/*!
 * Process Groups
 * Processes spawned from the same program image, with shared privilege
 */

use super::process::Process;
use super::program::Program;
use crate::core::links::SlotList;
use crate::core::types::{GroupId, Pid};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub struct ProcessGroup {
    id: GroupId,
    program: Arc<Program>,
    privileged: bool,
    parent: Option<Pid>,
    members: Mutex<SlotList<Pid>>,
}

impl ProcessGroup {
    pub fn new(id: GroupId, program: Arc<Program>, privileged: bool, parent: Option<Pid>) -> Self {
        Self {
            id,
            program,
            privileged,
            parent,
            members: Mutex::new(SlotList::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> GroupId {
        self.id
    }

    #[inline]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    #[inline]
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Process told about terminations in this group
    #[inline]
    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    /// Link `process` into this group
    ///
    /// # Panics
    /// If the process is already a member of a group.
    pub fn add(&self, process: &Process) {
        assert!(
            !process.is_in_group(),
            "process {} is already in a process group",
            process.id()
        );
        let handle = self.members.lock().push_back(process.id());
        process.link_group(handle);
    }

    /// Unlink `process`; `false` if it was not a member
    pub fn remove(&self, process: &Process) -> bool {
        let Some(handle) = process.unlink_group() else {
            return false;
        };
        self.members.lock().remove(handle).is_some()
    }

    /// Member ids in spawn order
    pub fn members(&self) -> Vec<Pid> {
        self.members.lock().iter().copied().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }
}

impl fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("id", &self.id)
            .field("program", &self.program.name())
            .field("privileged", &self.privileged)
            .field("parent", &self.parent)
            .field("members", &self.member_count())
            .finish()
    }
}
