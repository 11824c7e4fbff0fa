//! Prometheus metrics for message bus

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Total messages published
    pub static ref MESSAGE_PUBLISH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "message_bus_publish_total",
        "Total messages published",
        &["message_type", "status"]
    )
    .unwrap();

    /// Total messages received
    pub static ref MESSAGE_RECEIVE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "message_bus_receive_total",
        "Total messages received",
        &["message_type", "status"]
    )
    .unwrap();

    /// Messages skipped by lagging subscribers
    pub static ref MESSAGE_LAGGED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "message_bus_lagged_total",
        "Messages dropped by lagging subscribers",
        &["subscriber"]
    )
    .unwrap();
}
