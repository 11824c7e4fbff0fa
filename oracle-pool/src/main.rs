//! Oracle pool demo
//!
//! Walks one flight from registration to payout: an airline joins,
//! a passenger insures the flight, the simulated pool answers status
//! requests until a round resolves, then the passenger withdraws.

use ledger_core::Address;
use message_bus::{InMemoryBus, MessageFilter, MessageType};
use oracle_pool::{OraclePool, PoolConfig};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use surety_engine::{spawn_engine_actor, Config, FlightStatusInfo, SuretyEngine};

const FLIGHT: &str = "ND1309";
const MAX_REQUESTS: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    let pool_config = PoolConfig::from_env()?;
    let owner = config.ledger.owner.clone();
    let premium = Decimal::new(8, 1);

    println!("\n=================================================================");
    println!(" FlightSurety - Oracle Pool Demo");
    println!("=================================================================\n");

    let bus = Arc::new(InMemoryBus::with_capacity(config.bus_capacity));
    let capacity = config.actor.mailbox_capacity;
    let handle = spawn_engine_actor(SuretyEngine::new(config)?, bus.clone(), capacity);

    // Second airline joins and pays its way into the voter set
    let airline = Address::new("0xairline2");
    handle.register_airline(airline.clone(), owner.clone()).await?;
    let fee = handle.query(|engine| engine.ledger().registration_fee()).await??;
    handle.pay_registration_fee(airline.clone(), fee).await?;
    println!("Airline {} registered and paid {} fee", airline, fee);

    let departure = chrono::Utc::now().timestamp() + 2 * 3600;
    let flight_id = handle
        .register_flight(FLIGHT, departure, airline.clone())
        .await?;
    println!("Flight {} #{} departs at {}", FLIGHT, flight_id, departure);

    let passenger = Address::new("0xpassenger");
    handle
        .buy_insurance(flight_id, premium, passenger.clone())
        .await?;
    println!("Passenger {} insured for {}", passenger, premium);

    let pool = Arc::new(OraclePool::register(handle.clone(), &pool_config).await?);
    println!(
        "{} oracles registered, {} always blame the airline\n",
        handle.oracles_count().await?,
        pool_config.late_reporters()
    );
    let pool_task = pool.clone().spawn(&bus);

    let mut status_info = bus.subscribe(
        "demo-status",
        MessageFilter::only([MessageType::FlightStatusInfo]),
    );

    let mut resolved = None;
    for attempt in 1..=MAX_REQUESTS {
        let ticket = handle
            .request_status(airline.clone(), FLIGHT, departure, passenger.clone())
            .await?;
        println!(
            "Request {}: round #{} at index {} ({} oracles hold it)",
            attempt,
            ticket.round_id,
            ticket.key.index,
            pool.holders(ticket.key.index)
        );

        match tokio::time::timeout(Duration::from_secs(2), status_info.recv()).await {
            Ok(message) => {
                let info: FlightStatusInfo = message?.decode_payload()?;
                resolved = Some(info);
                break;
            }
            Err(_) => println!("  no quorum yet"),
        }
    }

    match resolved {
        Some(info) => println!("\nFlight {} resolved as {}", info.flight, info.status),
        None => println!("\nNo round reached quorum after {} requests", MAX_REQUESTS),
    }

    let credited = handle.get_credited_amount(passenger.clone()).await?;
    println!("Passenger credit: {}", credited);

    if credited > Decimal::ZERO {
        let transfer = handle
            .withdraw(credited, passenger.clone(), passenger)
            .await?;
        println!("Transferred {} to {}", transfer.amount, transfer.to);
    }

    let treasury = handle.treasury().await?;
    println!(
        "Funds held: {}, solvent: {}\n",
        treasury.held(),
        handle.check_solvency().await?
    );

    handle.shutdown().await?;
    pool_task.abort();
    Ok(())
}
