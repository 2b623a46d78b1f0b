/*!
 * Object Notifier
 * GC-visible wake object that posts one notification into a mailbox
 */

use super::message::{Message, ObjectNotifyMessage};
use super::process::Process;
use crate::memory::HeapRef;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Watches one heap object on behalf of one process
///
/// Owns a single `ObjectNotifyMessage`. Notifying while that message is
/// still queued is a no-op, so a slow receiver sees at most one pending
/// notification per notifier.
pub struct ObjectNotifier {
    process: Weak<Process>,
    object: HeapRef,
    message: Arc<ObjectNotifyMessage>,
}

impl ObjectNotifier {
    pub fn new(process: &Arc<Process>, object: HeapRef) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            process: Arc::downgrade(process),
            object,
            message: Arc::new(ObjectNotifyMessage::new(weak.clone())),
        })
    }

    /// Receiving process, unless it was already reaped
    pub fn process(&self) -> Option<Arc<Process>> {
        self.process.upgrade()
    }

    #[inline]
    pub fn object(&self) -> HeapRef {
        self.object
    }

    #[inline]
    pub fn message(&self) -> &Arc<ObjectNotifyMessage> {
        &self.message
    }

    /// Queue the notification; `false` if it is already queued or the
    /// receiver is gone
    pub fn notify(&self) -> bool {
        let Some(process) = self.process.upgrade() else {
            return false;
        };
        if !self.message.mark_queued() {
            trace!(pid = process.id(), "Notification already queued");
            return false;
        }
        process.send_mail(Message::ObjectNotify(Arc::clone(&self.message)));
        true
    }
}

impl Drop for ObjectNotifier {
    fn drop(&mut self) {
        if self.message.clear_object_notifier() {
            trace!(object = ?self.object, "Released unqueued notification");
        }
    }
}

impl fmt::Debug for ObjectNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectNotifier")
            .field("pid", &self.process.upgrade().map(|p| p.id()))
            .field("object", &self.object)
            .field("ownership", &self.message.ownership())
            .finish()
    }
}
