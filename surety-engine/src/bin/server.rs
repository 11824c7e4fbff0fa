//! Surety node binary

use async_trait::async_trait;
use message_bus::{InMemoryBus, Message, MessageFilter, MessageHandler};
use std::sync::Arc;
use std::time::Duration;
use surety_engine::{spawn_engine_actor, Config, RoundExpiryScheduler, SuretyEngine};

/// Writes every notification to the log
struct NotificationLog;

#[async_trait]
impl MessageHandler for NotificationLog {
    async fn handle(&self, message: Message) -> message_bus::Result<()> {
        tracing::info!(
            subject = %message.subject(),
            payload = %message.payload,
            "Notification"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting FlightSurety node");

    // Load configuration
    let config = match std::env::var("SURETY_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };

    let bus = Arc::new(InMemoryBus::with_capacity(config.bus_capacity));
    let log = bus.subscribe("notification-log", MessageFilter::all());
    tokio::spawn(log.run(Arc::new(NotificationLog)));
    tracing::info!(
        capacity = bus.capacity(),
        subscribers = bus.subscriber_count(),
        "Message bus ready"
    );

    let scheduler = config.scheduler.clone();
    let capacity = config.actor.mailbox_capacity;
    let engine = SuretyEngine::new(config)?;
    let handle = spawn_engine_actor(engine, bus.clone(), capacity);
    tracing::info!("Engine actor started");

    if scheduler.enabled {
        RoundExpiryScheduler::new(
            handle.clone(),
            Duration::from_secs(scheduler.sweep_interval_secs),
        )
        .spawn();
    }

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down FlightSurety node");
    handle.shutdown().await?;
    Ok(())
}
