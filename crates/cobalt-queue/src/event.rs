//! # Events
//!
//! Shared completion tokens handed out by enqueues.

use alloc::sync::Arc;

use cobalt_core::TransferDirection;

/// Operation an event was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// Image to host
    ReadImage,
    /// Host to image
    WriteImage,
}

impl From<TransferDirection> for CommandType {
    fn from(direction: TransferDirection) -> Self {
        match direction {
            TransferDirection::Read => Self::ReadImage,
            TransferDirection::Write => Self::WriteImage,
        }
    }
}

#[derive(Debug)]
struct EventInner {
    queue_id: u32,
    command_type: CommandType,
    task_level: u32,
    task_count: u32,
}

/// Completion token of one enqueue
///
/// Cloning shares the token. Its fields are fixed at creation.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub(crate) fn new(queue_id: u32, command_type: CommandType, task_level: u32, task_count: u32) -> Self {
        Self {
            inner: Arc::new(EventInner {
                queue_id,
                command_type,
                task_level,
                task_count,
            }),
        }
    }

    /// Queue that created the event
    #[inline]
    pub fn queue_id(&self) -> u32 {
        self.inner.queue_id
    }

    /// Operation type
    #[inline]
    pub fn command_type(&self) -> CommandType {
        self.inner.command_type
    }

    /// Logical ordering point
    #[inline]
    pub fn task_level(&self) -> u32 {
        self.inner.task_level
    }

    /// Task count the event completes with
    #[inline]
    pub fn task_count(&self) -> u32 {
        self.inner.task_count
    }

    /// Check completion against the receiver's completed count
    pub fn is_complete(&self, completed: u32) -> bool {
        self.inner.task_count <= completed
    }

    /// Handles sharing this event
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_handle() {
        let event = Event::new(3, CommandType::ReadImage, 7, 2);
        assert_eq!(event.ref_count(), 1);
        let held = event.clone();
        assert_eq!(event.ref_count(), 2);
        assert_eq!(held.task_level(), 7);
        assert_eq!(held.queue_id(), 3);
        drop(held);
        assert_eq!(event.ref_count(), 1);
    }

    #[test]
    fn test_is_complete() {
        let event = Event::new(1, CommandType::WriteImage, 1, 4);
        assert!(!event.is_complete(3));
        assert!(event.is_complete(4));
        assert_eq!(CommandType::from(TransferDirection::Write), event.command_type());
    }
}
