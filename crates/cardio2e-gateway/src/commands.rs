//! MQTT commands to the bus
//!
//! Runs on the MQTT command worker thread. Every command goes through the
//! shared [`Connection`], so it serializes with the listener and startup
//! queries on the connection's own lock.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use cardio2e_core::entity::{EntityType, HvacRecord, HvacSetting};
use cardio2e_core::protocol::{Command, Connection, ProtocolError};
use cardio2e_core::state::GatewayState;

use crate::bridge::hvac_setting_payload;
use crate::publisher::Publisher;
use crate::topics::{self, Inbound};

/// The live bus connection, empty while the supervisor reconnects
pub type ConnectionSlot = Arc<Mutex<Option<Connection>>>;

/// Why an inbound command was not sent
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown command topic {0}")]
    InvalidTopic(String),

    #[error("Invalid payload {payload:?} for {topic}")]
    InvalidPayload { topic: String, payload: String },

    #[error("Bus is not connected")]
    Offline,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Turns inbound MQTT publishes into bus commands
pub struct CommandRouter {
    slot: ConnectionSlot,
    state: Arc<GatewayState>,
    publisher: Arc<dyn Publisher>,
    alarm_code: u32,
    zone_count: usize,
}

impl CommandRouter {
    pub fn new(
        slot: ConnectionSlot,
        state: Arc<GatewayState>,
        publisher: Arc<dyn Publisher>,
        alarm_code: u32,
        zone_count: usize,
    ) -> Self {
        Self {
            slot,
            state,
            publisher,
            alarm_code,
            zone_count,
        }
    }

    fn connection(&self) -> Result<Connection, CommandError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CommandError::Offline)
    }

    /// Handle one inbound publish
    pub fn handle(&self, topic: &str, payload: &str) -> Result<(), CommandError> {
        let inbound = topics::parse_inbound(topic)
            .ok_or_else(|| CommandError::InvalidTopic(topic.to_string()))?;
        self.state.set_last_command(format!("{} {}", topic, payload));

        let value = payload.trim().to_ascii_uppercase();
        let invalid = || CommandError::InvalidPayload {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };

        match inbound {
            Inbound::Light(id) => {
                let level = match value.as_str() {
                    "ON" => 100,
                    "OFF" => 0,
                    other => percent(other).ok_or_else(invalid)?,
                };
                self.send(&Command::set(EntityType::Light, id, level.to_string()))?;
                info!("Light {} set to {}", id, level);
            }
            Inbound::Switch(id) => {
                let code = match value.as_str() {
                    "ON" => "O",
                    "OFF" => "C",
                    _ => return Err(invalid()),
                };
                self.send(&Command::set(EntityType::Switch, id, code))?;
                info!("Switch {} set to {}", id, value);
            }
            Inbound::CoverPosition(id) => {
                let position = percent(&value).ok_or_else(invalid)?;
                self.send(&Command::set(EntityType::Cover, id, position.to_string()))?;
                info!("Cover {} set to {}", id, position);
            }
            Inbound::CoverCommand(id) => {
                let position = match value.as_str() {
                    "OPEN" => "100".to_string(),
                    "CLOSE" => "0".to_string(),
                    "STOP" => self.current_cover_position(id)?,
                    _ => return Err(invalid()),
                };
                self.send(&Command::set(EntityType::Cover, id, position.clone()))?;
                info!("Cover {} {} (position {})", id, value, position);
            }
            Inbound::Hvac { id, field } => {
                let setting = HvacSetting::parse(&field, payload).ok_or_else(invalid)?;
                self.set_hvac(id, setting)?;
            }
            Inbound::Alarm(id) => {
                let code = match value.as_str() {
                    "ARMED_AWAY" => "A",
                    "DISARMED" => "D",
                    _ => return Err(invalid()),
                };
                let command = Command::set(
                    EntityType::Security,
                    id,
                    format!("{} {}", code, self.alarm_code),
                );
                self.send(&command)?;
                info!("Alarm {} set to {}", id, value.to_ascii_lowercase());
            }
            Inbound::Bypass(zone) => {
                let bypassed = match value.as_str() {
                    "ON" => true,
                    "OFF" => false,
                    _ => return Err(invalid()),
                };
                let conn = self.connection()?;
                let states = self.state.toggle_bypass(zone, bypassed, self.zone_count, |states| {
                    conn.send(&Command::set(EntityType::ZoneBypass, 1, states))
                })?;
                info!("Zone {} bypass {} ({})", zone, value, states);
            }
        }
        Ok(())
    }

    fn send(&self, command: &Command) -> Result<(), CommandError> {
        self.connection()?.send(command)?;
        Ok(())
    }

    /// Stopping a moving cover re-sends the position it reports right now
    fn current_cover_position(&self, id: u32) -> Result<String, CommandError> {
        let answer = self.connection()?.query(EntityType::Cover, id)?;
        answer
            .token(3)
            .map(str::to_string)
            .ok_or_else(|| {
                ProtocolError::InvalidCommand(format!("cover answer without position: {}", answer))
                    .into()
            })
    }

    /// Merge one field; the record is stored and published only once the
    /// `@S H` it completes was written, or right away while still partial
    fn set_hvac(&self, id: u32, setting: HvacSetting) -> Result<(), CommandError> {
        let payload = hvac_setting_payload(&setting);
        let send = |record: &HvacRecord| -> Result<(), CommandError> {
            match record.setpoint() {
                Ok(setpoint) => {
                    self.send(&Command::SetHvac { id, setpoint })?;
                    info!("HVAC {} {} set to {}", id, setting.field(), payload);
                }
                Err(e) => warn!("HVAC {} not sent yet: {}", id, e),
            }
            Ok(())
        };
        self.state.apply_hvac_setting(id, setting, send)?;

        self.publisher
            .publish(&topics::hvac_state(id, setting.field()), &payload, true);
        Ok(())
    }
}

fn percent(value: &str) -> Option<u8> {
    value.parse::<u8>().ok().filter(|v| *v <= 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::recording::RecordingPublisher;
    use cardio2e_core::entity::{FanState, HvacMode, HvacReport};
    use cardio2e_core::protocol::mock::MockTransport;
    use cardio2e_core::protocol::{ConnectionConfig, RetryPolicy};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Fixture {
        mock: MockTransport,
        router: CommandRouter,
        state: Arc<GatewayState>,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let mock = MockTransport::new();
        let config = ConnectionConfig {
            query: RetryPolicy::new(Duration::from_millis(50), 2, Duration::ZERO),
            ..ConnectionConfig::default()
        };
        let conn = Connection::from_transport(mock.clone(), config);
        let state = Arc::new(GatewayState::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let router = CommandRouter::new(
            Arc::new(Mutex::new(Some(conn))),
            state.clone(),
            publisher.clone(),
            12345,
            4,
        );
        Fixture {
            mock,
            router,
            state,
            publisher,
        }
    }

    #[test]
    fn test_light_payloads() {
        let f = fixture();
        f.router.handle("cardio2e/light/set/1", "ON").unwrap();
        f.router.handle("cardio2e/light/set/2", "off").unwrap();
        f.router.handle("cardio2e/light/set/3", " 45 ").unwrap();

        assert!(matches!(
            f.router.handle("cardio2e/light/set/3", "101"),
            Err(CommandError::InvalidPayload { .. })
        ));
        assert!(matches!(
            f.router.handle("cardio2e/light/set/3", "bright"),
            Err(CommandError::InvalidPayload { .. })
        ));
        assert_eq!(f.mock.sent_lines(), vec!["@S L 1 100", "@S L 2 0", "@S L 3 45"]);
    }

    #[test]
    fn test_switch_and_alarm() {
        let f = fixture();
        f.router.handle("cardio2e/switch/set/5", "ON").unwrap();
        f.router.handle("cardio2e/switch/set/5", "OFF").unwrap();
        f.router.handle("cardio2e/alarm/set/1", "armed_away").unwrap();
        f.router.handle("cardio2e/alarm/set/1", "disarmed").unwrap();

        assert_eq!(
            f.mock.sent_lines(),
            vec!["@S R 5 O", "@S R 5 C", "@S S 1 A 12345", "@S S 1 D 12345"]
        );
        assert_eq!(
            f.state.diagnostics().last_command.as_deref(),
            Some("cardio2e/alarm/set/1 disarmed")
        );
    }

    #[test]
    fn test_cover_commands() {
        let f = fixture();
        f.mock.respond("@G C 2", "@I C 2 37\r");

        f.router.handle("cardio2e/cover/set/2", "60").unwrap();
        f.router.handle("cardio2e/cover/command/2", "OPEN").unwrap();
        f.router.handle("cardio2e/cover/command/2", "CLOSE").unwrap();
        f.router.handle("cardio2e/cover/command/2", "STOP").unwrap();

        assert_eq!(
            f.mock.sent_lines(),
            vec!["@S C 2 60", "@S C 2 100", "@S C 2 0", "@G C 2", "@S C 2 37"]
        );
    }

    #[test]
    fn test_cover_stop_fails_without_answer() {
        let f = fixture();
        let result = f.router.handle("cardio2e/cover/command/4", "STOP");

        assert!(matches!(
            result,
            Err(CommandError::Protocol(ProtocolError::RetriesExhausted { .. }))
        ));
        assert!(f.mock.sent_lines().iter().all(|l| l == "@G C 4"));
    }

    #[test]
    fn test_hvac_waits_for_complete_record() {
        let f = fixture();

        f.router.handle("cardio2e/hvac/1/set/mode", "heat").unwrap();
        assert!(f.mock.sent_lines().is_empty());
        assert_eq!(
            f.publisher.last("cardio2e/hvac/1/state/mode").as_deref(),
            Some("heat")
        );

        f.state.merge_hvac(
            1,
            &HvacReport {
                heating_setpoint: 20.0,
                cooling_setpoint: 25.0,
                fan: FanState::Off,
                mode: HvacMode::Auto,
            },
        );
        f.router
            .handle("cardio2e/hvac/1/set/heating_setpoint", "21.5")
            .unwrap();

        assert_eq!(f.mock.sent_lines(), vec!["@S H 1 21.5 25 S A"]);
    }

    #[test]
    fn test_bypass_sends_full_string() {
        let f = fixture();
        f.state.set_bypass("NNNN");

        f.router.handle("cardio2e/zone/bypass/set/2", "ON").unwrap();
        f.router.handle("cardio2e/zone/bypass/set/4", "ON").unwrap();
        f.router.handle("cardio2e/zone/bypass/set/2", "OFF").unwrap();

        assert_eq!(
            f.mock.sent_lines(),
            vec!["@S B 1 NYNN", "@S B 1 NYNY", "@S B 1 NNNY"]
        );
        assert!(matches!(
            f.router.handle("cardio2e/zone/bypass/set/9", "ON"),
            Err(CommandError::Protocol(ProtocolError::InvalidCommand(_)))
        ));
    }

    #[test]
    fn test_failed_bypass_write_is_not_remembered() {
        let f = fixture();
        f.state.set_bypass("NNNN");

        f.mock.fail_writes(true);
        assert!(matches!(
            f.router.handle("cardio2e/zone/bypass/set/2", "ON"),
            Err(CommandError::Protocol(ProtocolError::IoError(_)))
        ));
        assert_eq!(f.state.bypass(), "NNNN");

        f.mock.fail_writes(false);
        f.router.handle("cardio2e/zone/bypass/set/4", "ON").unwrap();
        assert_eq!(f.mock.sent_lines(), vec!["@S B 1 NNNY"]);
        assert_eq!(f.state.bypass(), "NNNY");
    }

    #[test]
    fn test_failed_hvac_write_is_not_merged_or_published() {
        let f = fixture();
        f.state.merge_hvac(
            1,
            &HvacReport {
                heating_setpoint: 20.0,
                cooling_setpoint: 25.0,
                fan: FanState::Off,
                mode: HvacMode::Auto,
            },
        );

        f.mock.fail_writes(true);
        assert!(f.router.handle("cardio2e/hvac/1/set/mode", "cool").is_err());
        assert_eq!(f.state.hvac(1).and_then(|r| r.mode), Some(HvacMode::Auto));
        assert_eq!(f.publisher.last("cardio2e/hvac/1/state/mode"), None);

        f.mock.fail_writes(false);
        f.router.handle("cardio2e/hvac/1/set/fan", "on").unwrap();
        assert_eq!(f.mock.sent_lines(), vec!["@S H 1 20 25 R A"]);
        assert_eq!(f.publisher.last("cardio2e/hvac/1/state/fan").as_deref(), Some("on"));
    }

    #[test]
    fn test_implausible_setpoint_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.router.handle("cardio2e/hvac/1/set/heating_setpoint", "inf"),
            Err(CommandError::InvalidPayload { .. })
        ));
        assert!(f.state.hvac(1).is_none());
    }

    #[test]
    fn test_offline_and_unknown_topics() {
        let f = fixture();
        f.router.slot.lock().unwrap().take();

        assert!(matches!(
            f.router.handle("cardio2e/light/set/1", "ON"),
            Err(CommandError::Offline)
        ));
        assert!(matches!(
            f.router.handle("cardio2e/light/state/1", "ON"),
            Err(CommandError::InvalidTopic(_))
        ));

        // Snapshot untouched when the toggle cannot be sent
        f.state.set_bypass("NNNN");
        assert!(f.router.handle("cardio2e/zone/bypass/set/1", "ON").is_err());
        assert_eq!(f.state.bypass(), "NNNN");
    }
}
