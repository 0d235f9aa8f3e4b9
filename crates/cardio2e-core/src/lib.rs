//! # Cardio2e Core Library
//!
//! Line protocol engine for the Cardio2e RS-232 home-automation bus.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Framing of the raw serial byte stream into bus messages
//! - Classification and parsing of ack, nack and info messages
//! - Encoding of set/get/name/login/date commands
//! - A synchronous query engine with timeouts and bounded retries
//! - The login/logout handshake and the post-login announcement burst
//! - The long-running listener loop that dispatches bus events to handlers
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cardio2e_core::protocol::{Connection, ConnectionConfig, Listener, ListenerConfig};
//! use cardio2e_core::state::GatewayState;
//!
//! let conn = Connection::open("/dev/ttyUSB0", 9600, ConnectionConfig::default())?;
//! let burst = conn.login("00000")?;
//!
//! let state = Arc::new(GatewayState::new());
//! let mut listener = Listener::new(conn.clone(), state.clone(), ListenerConfig::default());
//! listener.replay_login(&mut handler, burst.messages());
//! listener.run(&mut handler);
//! ```

pub mod entity;
pub mod protocol;
pub mod state;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::entity::{
        BypassState, EntityRef, EntityType, FanState, HvacMode, HvacRecord, HvacSetpoint,
        SecurityState, SwitchState, ZoneConfig, ZoneState,
    };
    pub use crate::protocol::{
        BusHandler, BusMessage, Command, Connection, ConnectionConfig, Event, Framer, Listener,
        ListenerConfig, ProtocolError, SessionState,
    };
    pub use crate::state::{Diagnostics, GatewayState};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
