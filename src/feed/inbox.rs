//! Lock-free batch inbox between transport tasks and the session
//!
//! Uses crossbeam-channel for MPSC hand-off: transport tasks submit whole
//! batches without blocking, and the session drains everything that arrived
//! at its next ingestion point.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::feed::protocol::CaptureSource;
use crate::game::packet::PacketDescriptor;

/// Default number of buffered messages
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// One message from the transport
#[derive(Debug, Clone)]
pub enum InboxMessage {
    /// Decoded packets, in feed order
    Batch(Vec<PacketDescriptor>),
    /// Current set of active capture sources
    Sources(Vec<CaptureSource>),
}

/// Inbox errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InboxError {
    #[error("Inbox is full")]
    Full,
    #[error("Inbox receiver disconnected")]
    Disconnected,
}

impl<T> From<TrySendError<T>> for InboxError {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => InboxError::Full,
            TrySendError::Disconnected(_) => InboxError::Disconnected,
        }
    }
}

/// Bounded inbox owned by the session
pub struct BatchInbox {
    sender: Sender<InboxMessage>,
    receiver: Receiver<InboxMessage>,
    capacity: usize,
}

impl BatchInbox {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            capacity: capacity.max(1),
        }
    }

    /// Clonable handle for a transport task
    pub fn sender(&self) -> BatchSender {
        BatchSender {
            sender: self.sender.clone(),
        }
    }

    /// Submit a batch without blocking
    #[inline]
    pub fn try_submit(&self, batch: Vec<PacketDescriptor>) -> Result<(), InboxError> {
        self.sender.try_send(InboxMessage::Batch(batch)).map_err(InboxError::from)
    }

    /// Everything buffered so far, in arrival order
    pub fn drain(&self) -> Vec<InboxMessage> {
        self.receiver.try_iter().collect()
    }

    /// Discard everything buffered
    pub fn clear(&self) -> usize {
        self.receiver.try_iter().count()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BatchInbox {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

/// Clonable sender handle for transport tasks
#[derive(Clone)]
pub struct BatchSender {
    sender: Sender<InboxMessage>,
}

impl BatchSender {
    /// Submit a packet batch (non-blocking, fails under backpressure)
    #[inline]
    pub fn try_submit(&self, batch: Vec<PacketDescriptor>) -> Result<(), InboxError> {
        self.sender.try_send(InboxMessage::Batch(batch)).map_err(InboxError::from)
    }

    /// Submit a capture source update
    #[inline]
    pub fn try_update_sources(&self, sources: Vec<CaptureSource>) -> Result<(), InboxError> {
        self.sender.try_send(InboxMessage::Sources(sources)).map_err(InboxError::from)
    }
}
