//! Message publisher and the in-process bus

use crate::{
    message::Message,
    metrics::MESSAGE_PUBLISH_TOTAL,
    subscriber::{MessageFilter, Subscriber},
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Outbound notification channel
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a message, returning how many subscribers received it
    ///
    /// Having no subscribers is not an error.
    async fn publish(&self, message: Message) -> crate::Result<usize>;
}

/// In-process bus backed by a broadcast channel
#[derive(Debug)]
pub struct InMemoryBus {
    sender: broadcast::Sender<Message>,
    published: AtomicU64,
    capacity: usize,
}

impl InMemoryBus {
    /// Create bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create bus with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to messages matching a filter
    ///
    /// Only messages published after this call are seen.
    pub fn subscribe(&self, name: impl Into<String>, filter: MessageFilter) -> Subscriber {
        let name = name.into();
        debug!(subscriber = %name, "New subscription created");
        Subscriber::new(name, self.sender.subscribe(), filter)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total messages published
    pub fn messages_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, message: Message) -> crate::Result<usize> {
        let prefix = message.message_type.subject_prefix();
        let subject = message.subject();
        let id = message.id;
        self.published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(message) {
            Ok(receivers) => {
                MESSAGE_PUBLISH_TOTAL
                    .with_label_values(&[prefix, "delivered"])
                    .inc();
                debug!(%id, %subject, receivers, "Message published");
                Ok(receivers)
            }
            Err(_) => {
                MESSAGE_PUBLISH_TOTAL
                    .with_label_values(&[prefix, "dropped"])
                    .inc();
                warn!(%id, %subject, "Message dropped (no subscribers)");
                Ok(0)
            }
        }
    }
}
