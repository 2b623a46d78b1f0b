/*!
 * Mailbox
 * FIFO of messages; any thread may post, only the owning process consumes
 */

use super::message::Message;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail; never blocks beyond the queue lock
    pub fn post(&self, message: Message) {
        self.queue.lock().push_back(message);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Mutable view of the head message
    ///
    /// Holds the queue lock until the guard is dropped.
    pub fn peek(&self) -> Option<MappedMutexGuard<'_, Message>> {
        MutexGuard::try_map(self.queue.lock(), |queue| queue.front_mut()).ok()
    }

    /// Pop the head, applying the ownership gate to notifications
    ///
    /// Returns `None` for an empty mailbox, otherwise whether the message
    /// was released by this removal.
    pub fn remove_first(&self) -> Option<bool> {
        let message = self.queue.lock().pop_front()?;
        Some(Self::release(&message))
    }

    /// Remove every queued message; returns how many were released
    pub fn drain(&self) -> usize {
        let drained: Vec<Message> = self.queue.lock().drain(..).collect();
        drained.iter().filter(|m| Self::release(m)).count()
    }

    fn release(message: &Message) -> bool {
        match message {
            Message::System(_) => true,
            Message::ObjectNotify(notify) => {
                let released = notify.mark_dequeued();
                trace!(released, "Dequeued object notification");
                released
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::message::{SystemMessage, SystemMessageType};

    fn log(pid: u32) -> Message {
        Message::System(SystemMessage::empty(SystemMessageType::Log, 0, pid))
    }

    #[test]
    fn test_fifo() {
        let mailbox = Mailbox::new();
        mailbox.post(log(1));
        mailbox.post(log(2));

        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.peek().and_then(|m| m.as_system().map(|s| s.pid())), Some(1));
        assert_eq!(mailbox.remove_first(), Some(true));
        assert_eq!(mailbox.peek().and_then(|m| m.as_system().map(|s| s.pid())), Some(2));
        assert_eq!(mailbox.remove_first(), Some(true));
        assert_eq!(mailbox.remove_first(), None);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_peek_allows_taking_payload() {
        let mailbox = Mailbox::new();
        mailbox.post(Message::System(SystemMessage::new(
            SystemMessageType::Log,
            0,
            1,
            vec![1, 2, 3],
        )));

        let taken = mailbox
            .peek()
            .and_then(|mut m| m.as_system_mut().and_then(SystemMessage::take_data));
        assert_eq!(taken, Some(vec![1, 2, 3]));
        assert_eq!(mailbox.peek().map(|m| m.as_system().map(SystemMessage::len)), Some(Some(0)));
    }
}
