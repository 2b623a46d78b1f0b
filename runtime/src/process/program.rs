/*!
 * Program Images
 * Shared, immutable program descriptions referenced by processes
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Compiled method, addressed by its bytecode offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Method(pub u32);

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method@{}", self.0)
    }
}

/// Loaded snapshot image; the bytes are opaque to the runtime core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBundle(Arc<[u8]>);

impl SnapshotBundle {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        SnapshotBundle(bytes.into())
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Program image shared by every process running it
#[derive(Debug, Clone)]
pub struct Program {
    id: Uuid,
    name: String,
    entry_main: Method,
}

impl Program {
    pub fn new(name: impl Into<String>, entry_main: Method) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            entry_main,
        })
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry point used by `ProcessEntry::Main` and snapshot processes
    #[inline]
    pub fn entry_main(&self) -> Method {
        self.entry_main
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_ids_are_unique() {
        let a = Program::new("app", Method(3));
        let b = Program::new("app", Method(3));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "app");
        assert_eq!(a.entry_main(), Method(3));
    }

    #[test]
    fn test_method_serializes_transparently() {
        assert_eq!(serde_json::to_string(&Method(7)).unwrap(), "7");
    }
}
