//! The ingestion boundary.
//!
//! Platforms hand normalized messages to an [`EventIngress`]. The ingress
//! allocates the [`MessageEvent`] and pushes it onto a bounded FIFO queue;
//! the runtime's workers pull events off the shared [`EventReceiver`].
//!
//! ```text
//! ┌──────────┐  commit   ┌─────────────┐  recv   ┌──────────┐
//! │ Platform │──────────▶│ bounded mpsc│────────▶│ Worker N │
//! └──────────┘           └─────────────┘         └──────────┘
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use super::platform::{MessageSender, PlatformMeta};
use crate::foundation::error::IngestError;
use crate::foundation::event::MessageEvent;
use crate::foundation::message::InboundMessage;

/// Constructor for the event queue pair.
pub struct EventQueue;

impl EventQueue {
    /// Creates a queue holding at most `capacity` pending events.
    ///
    /// Events created by the ingress deliver through `sender`.
    pub fn bounded(
        capacity: usize,
        sender: Arc<dyn MessageSender>,
    ) -> (EventIngress, EventReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            EventIngress { tx, sender },
            EventReceiver {
                rx: Mutex::new(rx),
            },
        )
    }
}

/// Producer side of the queue. Cheap to clone; one per platform.
#[derive(Clone)]
pub struct EventIngress {
    tx: mpsc::Sender<Arc<MessageEvent>>,
    sender: Arc<dyn MessageSender>,
}

impl EventIngress {
    /// Wraps a message into a fresh event without enqueueing it.
    pub fn make_event(&self, message: InboundMessage, platform: &PlatformMeta) -> MessageEvent {
        MessageEvent::new(message, platform.clone(), Arc::clone(&self.sender))
    }

    /// Enqueues a message, waiting for space.
    pub async fn commit(
        &self,
        message: InboundMessage,
        platform: &PlatformMeta,
    ) -> Result<(), IngestError> {
        let event = Arc::new(self.make_event(message, platform));
        trace!(session = %event.session(), "Committing event");
        self.tx
            .send(event)
            .await
            .map_err(|_| IngestError::QueueClosed)
    }

    /// Enqueues a message, failing immediately if the queue is full.
    pub fn try_commit(
        &self,
        message: InboundMessage,
        platform: &PlatformMeta,
    ) -> Result<(), IngestError> {
        let event = Arc::new(self.make_event(message, platform));
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => IngestError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IngestError::QueueClosed,
        })
    }

    /// Enqueues an already built event.
    pub async fn commit_event(&self, event: Arc<MessageEvent>) -> Result<(), IngestError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| IngestError::QueueClosed)
    }
}

/// Consumer side of the queue, shared by all workers.
pub struct EventReceiver {
    rx: Mutex<mpsc::Receiver<Arc<MessageEvent>>>,
}

impl EventReceiver {
    /// Waits for the next event. `None` once every ingress is dropped and the
    /// queue is drained.
    pub async fn recv(&self) -> Option<Arc<MessageEvent>> {
        self.rx.lock().await.recv().await
    }

    /// Stops accepting new events; queued events can still be received.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }
}
