//! Filtered message subscriber

use crate::{
    message::Message,
    metrics::{MESSAGE_LAGGED_TOTAL, MESSAGE_RECEIVE_TOTAL},
    types::MessageType,
    Error, Result,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tracing::{debug, error, info, warn};

/// Message handler trait
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle incoming message
    async fn handle(&self, message: Message) -> Result<()>;
}

/// Which message types a subscriber wants
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    types: Option<HashSet<MessageType>>,
}

impl MessageFilter {
    /// Accept every message
    pub fn all() -> Self {
        Self { types: None }
    }

    /// Accept only the listed types
    pub fn only(types: impl IntoIterator<Item = MessageType>) -> Self {
        Self {
            types: Some(types.into_iter().collect()),
        }
    }

    /// Whether the message passes the filter
    pub fn matches(&self, message: &Message) -> bool {
        self.types
            .as_ref()
            .map_or(true, |types| types.contains(&message.message_type))
    }
}

/// Message subscriber
#[derive(Debug)]
pub struct Subscriber {
    name: String,
    receiver: broadcast::Receiver<Message>,
    filter: MessageFilter,
}

impl Subscriber {
    pub(crate) fn new(
        name: String,
        receiver: broadcast::Receiver<Message>,
        filter: MessageFilter,
    ) -> Self {
        Self {
            name,
            receiver,
            filter,
        }
    }

    /// Subscriber name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next matching message
    ///
    /// Lagging skips the dropped messages and keeps going; a closed bus
    /// is [`Error::Closed`].
    pub async fn recv(&mut self) -> Result<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => {
                    if self.filter.matches(&message) {
                        record_receive(&message);
                        return Ok(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => self.lagged(count),
                Err(broadcast::error::RecvError::Closed) => return Err(Error::Closed),
            }
        }
    }

    /// Receive a matching message without waiting
    pub fn try_recv(&mut self) -> Result<Option<Message>> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if self.filter.matches(&message) {
                        record_receive(&message);
                        return Ok(Some(message));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(count)) => self.lagged(count),
                Err(broadcast::error::TryRecvError::Closed) => return Err(Error::Closed),
            }
        }
    }

    /// Convert into a stream of matching messages
    pub fn into_stream(self) -> impl Stream<Item = Message> + Send + Unpin {
        let Subscriber {
            name,
            receiver,
            filter,
        } = self;

        BroadcastStream::new(receiver).filter_map(move |item| match item {
            Ok(message) if filter.matches(&message) => {
                record_receive(&message);
                Some(message)
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(count)) => {
                warn!(subscriber = %name, lagged = count, "Subscriber lagged, messages dropped");
                MESSAGE_LAGGED_TOTAL.with_label_values(&[name.as_str()]).inc_by(count);
                None
            }
        })
    }

    /// Feed every matching message to a handler until the bus closes
    ///
    /// Handler failures are logged and do not stop the loop.
    pub async fn run<H>(mut self, handler: Arc<H>) -> Result<()>
    where
        H: MessageHandler + ?Sized,
    {
        info!(subscriber = %self.name, "Subscriber started");

        loop {
            let message = match self.recv().await {
                Ok(message) => message,
                Err(Error::Closed) => break,
                Err(e) => return Err(e),
            };

            let prefix = message.message_type.subject_prefix();
            let id = message.id;
            match handler.handle(message).await {
                Ok(()) => debug!(subscriber = %self.name, %id, "Message handled"),
                Err(e) => {
                    error!(subscriber = %self.name, %id, error = %e, "Error handling message");
                    MESSAGE_RECEIVE_TOTAL
                        .with_label_values(&[prefix, "handler_error"])
                        .inc();
                }
            }
        }

        info!(subscriber = %self.name, "Subscriber stopped (bus closed)");
        Ok(())
    }

    fn lagged(&self, count: u64) {
        warn!(subscriber = %self.name, lagged = count, "Subscriber lagged, messages dropped");
        MESSAGE_LAGGED_TOTAL
            .with_label_values(&[self.name.as_str()])
            .inc_by(count);
    }
}

fn record_receive(message: &Message) {
    MESSAGE_RECEIVE_TOTAL
        .with_label_values(&[message.message_type.subject_prefix(), "success"])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        publisher::{InMemoryBus, Publisher},
        types::PartitionKey,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(message_type: MessageType) -> Message {
        Message::new(message_type, PartitionKey::Global, json!({}))
    }

    #[tokio::test]
    async fn test_filter_skips_other_types() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("oracles", MessageFilter::only([MessageType::OracleRequest]));

        bus.publish(message(MessageType::FundsAdded)).await.unwrap();
        bus.publish(message(MessageType::OracleRequest)).await.unwrap();

        assert_eq!(sub.recv().await.unwrap().message_type, MessageType::OracleRequest);
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_bus() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("sub", MessageFilter::all());
        drop(bus);
        assert!(matches!(sub.recv().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_recovers() {
        let bus = InMemoryBus::with_capacity(2);
        let mut sub = bus.subscribe("slow", MessageFilter::all());

        for _ in 0..5 {
            bus.publish(message(MessageType::FundsAdded)).await.unwrap();
        }
        bus.publish(message(MessageType::ConfigChanged)).await.unwrap();

        let mut last = None;
        while let Some(message) = sub.try_recv().unwrap() {
            last = Some(message.message_type);
        }
        assert_eq!(last, Some(MessageType::ConfigChanged));
    }

    #[tokio::test]
    async fn test_stream() {
        let bus = InMemoryBus::new();
        let mut stream = bus
            .subscribe("stream", MessageFilter::only([MessageType::OracleReport]))
            .into_stream();

        bus.publish(message(MessageType::FundsAdded)).await.unwrap();
        bus.publish(message(MessageType::OracleReport)).await.unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received.message_type, MessageType::OracleReport);
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl MessageHandler for Counter {
        async fn handle(&self, _message: Message) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_until_closed() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe("counter", MessageFilter::all());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        bus.publish(message(MessageType::FundsAdded)).await.unwrap();
        bus.publish(message(MessageType::FundsWithdrawn)).await.unwrap();
        drop(bus);

        sub.run(counter.clone()).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
