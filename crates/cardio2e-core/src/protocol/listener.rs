//! Listener loop and event dispatch
//!
//! A single thread polls the bus, frames and classifies what arrives and
//! hands every event to a [`BusHandler`]. Periodic work (date sync,
//! heartbeat) is gated on the monotonic clock and checked once per
//! iteration.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::{
    classify, BusMessage, Connection, Event, Framer, Nack, ProtocolError, TemperatureReading,
};
use crate::entity::{
    decode_bypass, decode_zones, BypassState, EntityRef, EntityType, HvacRecord, SecurityState,
    SwitchState, ZoneConfig, ZoneState,
};
use crate::state::{Diagnostics, GatewayState};

/// Receiver of dispatched bus events
///
/// Every method but [`rejected`](BusHandler::rejected) defaults to doing
/// nothing, so a handler only implements what it publishes.
#[allow(unused_variables)]
pub trait BusHandler {
    /// `@I L`
    fn light(&mut self, id: u32, brightness: u8) {}

    /// `@I R`
    fn switch(&mut self, id: u32, state: SwitchState) {}

    /// `@I C`
    fn cover(&mut self, id: u32, position: &str) {}

    /// `@I H`, with the report already merged into the stored record
    fn hvac(&mut self, id: u32, record: &HvacRecord) {}

    /// `@I T`, with the reading already stored on the HVAC record
    fn temperature(&mut self, id: u32, reading: &TemperatureReading) {}

    /// `@I S`
    fn security(&mut self, id: u32, state: SecurityState) {}

    /// `@I Z`, decoded for the configured zones
    fn zones(&mut self, zones: &[(u32, ZoneState)]) {}

    /// `@I B`, decoded for the configured zones
    fn bypass(&mut self, zones: &[(u32, BypassState)]) {}

    /// `@I N`
    fn name(&mut self, entity: EntityType, id: u32, name: &str) {}

    /// `@A {T} {id}`
    fn acknowledged(&mut self, entity: EntityType, id: u32) {}

    /// `@N`; bus-reported errors must reach the error sink
    fn rejected(&mut self, nack: &Nack);

    /// A date sync was just sent
    fn date_synced(&mut self) {}

    /// Heartbeat interval elapsed
    fn heartbeat(&mut self, diagnostics: &Diagnostics) {}

    /// An entity appeared in the login announcement burst, before its state
    /// event is dispatched
    fn announced(&mut self, entity: EntityRef) {}
}

/// Listener timing and zone layout
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Interval between `@S D` date syncs
    pub date_sync_interval: Duration,
    /// Interval between heartbeat callbacks
    pub heartbeat_interval: Duration,
    /// Sleep when no bytes are waiting
    pub idle_sleep: Duration,
    /// Sleep after a failed iteration
    pub error_backoff: Duration,
    /// Zones to decode from `@I Z` and `@I B`
    pub zones: ZoneConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            date_sync_interval: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(30),
            idle_sleep: Duration::from_millis(10),
            error_backoff: Duration::from_secs(1),
            zones: ZoneConfig::default(),
        }
    }
}

/// The long-running bus reader
pub struct Listener {
    conn: Connection,
    state: Arc<GatewayState>,
    config: ListenerConfig,
    framer: Framer,
}

impl Listener {
    pub fn new(conn: Connection, state: Arc<GatewayState>, config: ListenerConfig) -> Self {
        Self {
            conn,
            state,
            config,
            framer: Framer::new(),
        }
    }

    /// Run until the transport is observed closed
    ///
    /// Any other failure is logged and counted, then the loop continues
    /// after `error_backoff`. Malformed frames never end the loop.
    pub fn run<H: BusHandler>(&mut self, handler: &mut H) {
        let mut last_sync = Instant::now();
        let mut last_heartbeat = Instant::now();
        info!("Listening for bus updates");

        loop {
            if !self.conn.is_open() {
                info!("Transport closed, listener exiting");
                break;
            }

            match self.poll(handler, &mut last_sync, &mut last_heartbeat) {
                Ok(true) => {}
                Ok(false) => thread::sleep(self.config.idle_sleep),
                Err(ProtocolError::NotConnected) => {
                    info!("Transport closed, listener exiting");
                    break;
                }
                Err(e) => {
                    error!("Error in bus listener: {}", e);
                    self.state.increment_errors();
                    thread::sleep(self.config.error_backoff);
                }
            }
        }
    }

    /// One iteration; returns whether any bytes were processed
    fn poll<H: BusHandler>(
        &mut self,
        handler: &mut H,
        last_sync: &mut Instant,
        last_heartbeat: &mut Instant,
    ) -> Result<bool, ProtocolError> {
        let now = Instant::now();

        if now.duration_since(*last_sync) >= self.config.date_sync_interval {
            let local = Local::now().naive_local();
            self.conn.send_date(local)?;
            info!("Sent date sync {}", local.format(super::commands::DATE_FORMAT));
            *last_sync = now;
            handler.date_synced();
        }

        if now.duration_since(*last_heartbeat) >= self.config.heartbeat_interval {
            handler.heartbeat(&self.state.diagnostics());
            *last_heartbeat = now;
        }

        let buffered = self.framer.pending();
        let messages = self.conn.read_available(&mut self.framer)?;
        let had_bytes = !messages.is_empty() || self.framer.pending() != buffered;
        for message in &messages {
            self.dispatch(handler, message);
        }
        Ok(had_bytes)
    }

    /// Dispatch the login announcement burst
    ///
    /// Each message is handled exactly like a listener message, preceded by
    /// [`BusHandler::announced`] for entity-bearing messages.
    pub fn replay_login<H: BusHandler>(&mut self, handler: &mut H, burst: &[BusMessage]) {
        for message in burst {
            let event = classify(message);
            if let Some(entity) = event.entity() {
                handler.announced(entity);
            }
            self.state.increment_messages();
            self.handle(handler, message, event);
        }
    }

    /// Classify one message and hand it to `handler`
    pub fn dispatch<H: BusHandler>(&mut self, handler: &mut H, message: &BusMessage) {
        debug!("Processing {}", message);
        self.state.increment_messages();
        let event = classify(message);
        self.handle(handler, message, event);
    }

    fn handle<H: BusHandler>(&mut self, handler: &mut H, message: &BusMessage, event: Event) {
        match event {
            Event::DateAck => info!("Date sync acknowledged"),
            Event::LoginAck => debug!("Late login acknowledgment"),
            Event::LogoutAck => warn!("Controller ended the session"),
            Event::Ack { entity, id } => {
                info!("OK for action {}", self.state.entity_label(entity, id));
                handler.acknowledged(entity, id);
                if entity == EntityType::ZoneBypass && id == 1 {
                    // The bus does not echo bypass changes it just acknowledged
                    self.refresh_bypass(handler);
                }
            }
            Event::Nack(nack) => {
                error!("NACK for transaction {}: {}", nack.raw, nack.description);
                self.state.increment_errors();
                handler.rejected(&nack);
            }
            Event::Light { id, brightness } => handler.light(id, brightness),
            Event::Switch { id, state } => handler.switch(id, state),
            Event::Cover { id, position } => handler.cover(id, &position),
            Event::Hvac { id, report } => {
                let record = self.state.merge_hvac(id, &report);
                handler.hvac(id, &record);
            }
            Event::Temperature { id, reading } => {
                self.state.set_current_temperature(id, reading.value);
                handler.temperature(id, &reading);
            }
            Event::Security { id, state } => handler.security(id, state),
            Event::Zones { states } => {
                handler.zones(&decode_zones(&states, &self.config.zones));
            }
            Event::Bypass { states } => {
                self.state.set_bypass(&states);
                handler.bypass(&decode_bypass(&states, self.config.zones.zone_count));
            }
            Event::Name { entity, id, name } => {
                self.state.set_entity_name(entity, id, &name);
                handler.name(entity, id, &name);
            }
            Event::Version(version) => info!("Cardio2e version {}", version),
            Event::Unrecognized { reason, .. } => {
                error!("Message not processed: {} ({})", message, reason);
                self.state.increment_errors();
            }
        }
    }

    fn refresh_bypass<H: BusHandler>(&mut self, handler: &mut H) {
        match self.conn.query(EntityType::ZoneBypass, 1) {
            Ok(answer) => {
                info!("Bypass zones re-published");
                self.dispatch(handler, &answer);
            }
            Err(e) => warn!("Bypass re-query failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::MockTransport;
    use crate::protocol::{ConnectionConfig, RetryPolicy};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        nacks: Vec<Nack>,
    }

    impl BusHandler for Recorder {
        fn light(&mut self, id: u32, brightness: u8) {
            self.events.push(format!("light {} {}", id, brightness));
        }

        fn hvac(&mut self, id: u32, record: &HvacRecord) {
            self.events
                .push(format!("hvac {} temp={:?}", id, record.current_temperature));
        }

        fn bypass(&mut self, zones: &[(u32, BypassState)]) {
            let flags: String = zones.iter().map(|(_, s)| s.as_str()).collect::<Vec<_>>().join(",");
            self.events.push(format!("bypass {}", flags));
        }

        fn announced(&mut self, entity: EntityRef) {
            self.events.push(format!("announced {}", entity));
        }

        fn rejected(&mut self, nack: &Nack) {
            self.nacks.push(nack.clone());
        }
    }

    fn listener(mock: &MockTransport, zone_count: usize) -> (Listener, Arc<GatewayState>) {
        let config = ConnectionConfig {
            query: RetryPolicy::new(Duration::from_millis(50), 2, Duration::ZERO),
            ..ConnectionConfig::default()
        };
        let conn = Connection::from_transport(mock.clone(), config);
        let state = Arc::new(GatewayState::new());
        let listener_config = ListenerConfig {
            zones: ZoneConfig {
                zone_count,
                inverted: Vec::new(),
            },
            ..ListenerConfig::default()
        };
        (Listener::new(conn, state.clone(), listener_config), state)
    }

    #[test]
    fn test_hvac_merge_keeps_temperature() {
        let mock = MockTransport::new();
        let (mut listener, state) = listener(&mock, 4);
        let mut handler = Recorder::default();

        listener.dispatch(&mut handler, &BusMessage::parse("@I T 1 20.5 H"));
        listener.dispatch(&mut handler, &BusMessage::parse("@I H 1 20 25 R C"));

        assert_eq!(handler.events, vec!["hvac 1 temp=Some(20.5)"]);
        assert_eq!(state.hvac(1).and_then(|r| r.current_temperature), Some(20.5));
    }

    #[test]
    fn test_bypass_ack_triggers_requery() {
        let mock = MockTransport::new();
        mock.respond("@G B 1", "@I B 1 NYNN\r");
        let (mut listener, state) = listener(&mock, 4);
        let mut handler = Recorder::default();

        listener.dispatch(&mut handler, &BusMessage::parse("@A B 1"));

        assert_eq!(mock.sent_lines(), vec!["@G B 1"]);
        assert_eq!(handler.events, vec!["bypass OFF,ON,OFF,OFF"]);
        assert_eq!(state.bypass(), "NYNN");
    }

    #[test]
    fn test_nack_is_forwarded_every_time() {
        let mock = MockTransport::new();
        let (mut listener, state) = listener(&mock, 4);
        let mut handler = Recorder::default();

        listener.dispatch(&mut handler, &BusMessage::parse("@N S 1 4"));
        listener.dispatch(&mut handler, &BusMessage::parse("@N S 1 4"));

        assert_eq!(handler.nacks.len(), 2);
        assert!(handler.nacks[0].description.contains("Security code is not valid"));
        assert_eq!(state.diagnostics().errors_count, 2);
    }

    #[test]
    fn test_unrecognized_is_counted_not_fatal() {
        let mock = MockTransport::new();
        let (mut listener, state) = listener(&mock, 4);
        let mut handler = Recorder::default();

        listener.dispatch(&mut handler, &BusMessage::parse("@I Q 1 2"));
        listener.dispatch(&mut handler, &BusMessage::parse("@I L 2 40"));

        assert_eq!(handler.events, vec!["light 2 40"]);
        let diag = state.diagnostics();
        assert_eq!(diag.errors_count, 1);
        assert_eq!(diag.messages_processed, 2);
    }

    #[test]
    fn test_replay_announces_before_state() {
        let mock = MockTransport::new();
        let (mut listener, _) = listener(&mock, 4);
        let mut handler = Recorder::default();

        let burst = vec![
            BusMessage::parse("@I V 2.1"),
            BusMessage::parse("@I L 1 100"),
        ];
        listener.replay_login(&mut handler, &burst);

        assert_eq!(handler.events, vec!["announced L 1", "light 1 100"]);
    }
}
