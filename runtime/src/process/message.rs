/*!
 * Messages
 *
 * Closed set of mailbox messages: system messages carrying an opaque byte
 * payload, and object notifications shared between an `ObjectNotifier` and
 * the receiving mailbox.
 */

use super::notifier::ObjectNotifier;
use crate::core::types::{GroupId, Pid};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// Message variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ObjectNotify = 1,
    System = 2,
}

/// A mailbox entry
#[derive(Debug)]
pub enum Message {
    System(SystemMessage),
    ObjectNotify(Arc<ObjectNotifyMessage>),
}

impl Message {
    #[inline]
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::System(_) => MessageType::System,
            Message::ObjectNotify(_) => MessageType::ObjectNotify,
        }
    }

    #[inline]
    pub fn is_system(&self) -> bool {
        matches!(self, Message::System(_))
    }

    #[inline]
    pub fn is_object_notify(&self) -> bool {
        matches!(self, Message::ObjectNotify(_))
    }

    pub fn as_system(&self) -> Option<&SystemMessage> {
        match self {
            Message::System(message) => Some(message),
            Message::ObjectNotify(_) => None,
        }
    }

    pub fn as_system_mut(&mut self) -> Option<&mut SystemMessage> {
        match self {
            Message::System(message) => Some(message),
            Message::ObjectNotify(_) => None,
        }
    }

    pub fn as_object_notify(&self) -> Option<&Arc<ObjectNotifyMessage>> {
        match self {
            Message::ObjectNotify(message) => Some(message),
            Message::System(_) => None,
        }
    }
}

impl From<SystemMessage> for Message {
    fn from(message: SystemMessage) -> Self {
        Message::System(message)
    }
}

// =============================================================================
// SYSTEM MESSAGES
// =============================================================================

/// System message type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageType {
    Terminated,
    Log,
    StackTrace,
    /// VM-defined extension
    Custom(i32),
}

impl SystemMessageType {
    pub const TERMINATED: i32 = 0;
    pub const LOG: i32 = 1;
    pub const STACK_TRACE: i32 = 2;

    pub const fn code(&self) -> i32 {
        match self {
            SystemMessageType::Terminated => Self::TERMINATED,
            SystemMessageType::Log => Self::LOG,
            SystemMessageType::StackTrace => Self::STACK_TRACE,
            SystemMessageType::Custom(code) => *code,
        }
    }

    pub const fn from_code(code: i32) -> Self {
        match code {
            Self::TERMINATED => SystemMessageType::Terminated,
            Self::LOG => SystemMessageType::Log,
            Self::STACK_TRACE => SystemMessageType::StackTrace,
            other => SystemMessageType::Custom(other),
        }
    }
}

/// Message created by the VM or another process, with an opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMessage {
    kind: SystemMessageType,
    gid: GroupId,
    pid: Pid,
    data: Option<Vec<u8>>,
}

impl SystemMessage {
    pub fn new(kind: SystemMessageType, gid: GroupId, pid: Pid, data: Vec<u8>) -> Self {
        Self {
            kind,
            gid,
            pid,
            data: Some(data),
        }
    }

    /// Message without payload
    pub fn empty(kind: SystemMessageType, gid: GroupId, pid: Pid) -> Self {
        Self {
            kind,
            gid,
            pid,
            data: None,
        }
    }

    #[inline]
    pub fn kind(&self) -> SystemMessageType {
        self.kind
    }

    /// Process group the message comes from
    #[inline]
    pub fn gid(&self) -> GroupId {
        self.gid
    }

    /// Process the message comes from
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn set_pid(&mut self, pid: Pid) {
        self.pid = pid;
    }

    #[inline]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take ownership of the payload, leaving the message empty
    pub fn take_data(&mut self) -> Option<Vec<u8>> {
        self.data.take()
    }

    /// Drop the message's claim on its payload
    pub fn clear_data(&mut self) {
        self.data = None;
    }
}

// =============================================================================
// OBJECT NOTIFICATIONS
// =============================================================================

/// Which sides currently hold an `ObjectNotifyMessage`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Ownership {
    /// Neither side; the message is released
    Unowned = 0,
    /// Notifier alive, message not queued
    OwnedByNotifier = 1,
    /// Notifier gone, message still queued
    OwnedByMailbox = 2,
    /// Notifier alive and message queued
    OwnedByBoth = 3,
}

impl Ownership {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Ownership::Unowned,
            1 => Ownership::OwnedByNotifier,
            2 => Ownership::OwnedByMailbox,
            _ => Ownership::OwnedByBoth,
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ownership::Unowned => "unowned",
            Ownership::OwnedByNotifier => "owned-by-notifier",
            Ownership::OwnedByMailbox => "owned-by-mailbox",
            Ownership::OwnedByBoth => "owned-by-both",
        };
        f.write_str(name)
    }
}

/// Notification that a watched object became relevant
///
/// Shared between its `ObjectNotifier` and at most one mailbox slot. The
/// message is released exactly when its ownership reaches `Unowned`.
#[derive(Debug)]
pub struct ObjectNotifyMessage {
    notifier: Mutex<Weak<ObjectNotifier>>,
    ownership: AtomicU8,
}

impl ObjectNotifyMessage {
    pub(crate) fn new(notifier: Weak<ObjectNotifier>) -> Self {
        Self {
            notifier: Mutex::new(notifier),
            ownership: AtomicU8::new(Ownership::OwnedByNotifier as u8),
        }
    }

    #[inline]
    pub fn ownership(&self) -> Ownership {
        Ownership::from_u8(self.ownership.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_queued(&self) -> bool {
        matches!(
            self.ownership(),
            Ownership::OwnedByMailbox | Ownership::OwnedByBoth
        )
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.ownership() == Ownership::Unowned
    }

    /// Claim the mailbox side; `false` if already queued or orphaned
    pub fn mark_queued(&self) -> bool {
        self.transition(|state| match state {
            Ownership::OwnedByNotifier => Some(Ownership::OwnedByBoth),
            _ => None,
        })
        .is_ok()
    }

    /// Give up the mailbox side
    ///
    /// Returns `true` when the notifier already let go, so the receiver now
    /// releases the message.
    pub fn mark_dequeued(&self) -> bool {
        match self.transition(|state| match state {
            Ownership::OwnedByBoth => Some(Ownership::OwnedByNotifier),
            Ownership::OwnedByMailbox => Some(Ownership::Unowned),
            _ => None,
        }) {
            Ok(previous) => previous == Ownership::OwnedByMailbox,
            Err(_) => false,
        }
    }

    /// Notifier this message belongs to, while it is alive
    pub fn object_notifier(&self) -> Option<Arc<ObjectNotifier>> {
        self.notifier.lock().upgrade()
    }

    /// Give up the notifier side
    ///
    /// Returns `true` when the message is not queued, so the notifier side
    /// releases it; otherwise the mailbox releases it on dequeue.
    pub fn clear_object_notifier(&self) -> bool {
        *self.notifier.lock() = Weak::new();
        match self.transition(|state| match state {
            Ownership::OwnedByNotifier => Some(Ownership::Unowned),
            Ownership::OwnedByBoth => Some(Ownership::OwnedByMailbox),
            _ => None,
        }) {
            Ok(previous) => previous == Ownership::OwnedByNotifier,
            Err(_) => false,
        }
    }

    fn transition<F>(&self, f: F) -> Result<Ownership, Ownership>
    where
        F: Fn(Ownership) -> Option<Ownership>,
    {
        self.ownership
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                f(Ownership::from_u8(raw)).map(|next| next as u8)
            })
            .map(Ownership::from_u8)
            .map_err(Ownership::from_u8)
    }
}
