//! # Cardio2e MQTT Gateway
//!
//! Publishes the state of a Cardio2e installation to an MQTT broker with
//! Home Assistant discovery, and turns MQTT commands back into bus
//! transactions. The line protocol itself lives in `cardio2e_core`.

pub mod bridge;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod gateway;
pub mod mqtt;
pub mod publisher;
pub mod topics;

pub use config::Config;
