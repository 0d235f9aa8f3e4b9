//! Bus messages and their classification
//!
//! A framed message is a list of whitespace separated tokens whose first
//! token names the message class. [`classify`] turns it into an [`Event`].

use std::fmt;

use crate::entity::{
    EntityRef, EntityType, FanState, HvacMode, HvacReport, SecurityState, SwitchState, TempStatus,
};

/// One framed bus message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    tokens: Vec<String>,
}

impl BusMessage {
    /// Tokenize a message string
    pub fn parse(text: &str) -> Self {
        Self {
            tokens: text.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Message tokens
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Token at `index`, if present
    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the message has no tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Message class from the leading token
    pub fn class(&self) -> Option<MessageClass> {
        self.token(0).and_then(MessageClass::from_marker)
    }

    /// Tokens joined by single spaces
    pub fn raw(&self) -> String {
        self.tokens.join(" ")
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw())
    }
}

/// Leading marker of a bus message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// `@A` positive acknowledgment
    Ack,
    /// `@N` negative acknowledgment
    Nack,
    /// `@I` state or info
    Info,
    /// `@S` set (outbound only)
    Set,
    /// `@G` get (outbound only)
    Get,
}

impl MessageClass {
    /// Parse a leading marker token
    pub fn from_marker(token: &str) -> Option<Self> {
        match token {
            "@A" => Some(MessageClass::Ack),
            "@N" => Some(MessageClass::Nack),
            "@I" => Some(MessageClass::Info),
            "@S" => Some(MessageClass::Set),
            "@G" => Some(MessageClass::Get),
            _ => None,
        }
    }
}

/// A negative acknowledgment reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    /// Type token of the rejected transaction (may not be an entity, e.g. 'P')
    pub object: String,
    /// Object id of the rejected transaction, if present
    pub id: Option<u32>,
    /// Numeric error code, if present
    pub code: Option<u8>,
    /// Human readable description of `code`
    pub description: &'static str,
    /// The message as received
    pub raw: String,
}

impl fmt::Display for Nack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (transaction: {})", self.description, self.raw)
    }
}

/// Description of a NACK error code
pub fn nack_description(code: Option<u8>) -> &'static str {
    match code {
        Some(1) => "Object type specified by the transaction is not recognized",
        Some(2) => "Object number is out of range for the object type specified",
        Some(3) => "One or more parameters are not valid",
        Some(4) => "Security code is not valid",
        Some(5) => "Transaction S (Set) not supported for the requested type of object",
        Some(6) => "Transaction G (Get) not supported for the requested type of object",
        Some(7) => "Transaction is refused because security is armed",
        Some(8) => "This zone can be ignored",
        Some(16) => "Security can not be armed because there are open zones",
        Some(17) => "Security can not be armed because there is a power problem",
        Some(18) => "Security can not be armed for an unknown reason",
        _ => "Unknown error code",
    }
}

/// Temperature reading of an HVAC sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub value: f32,
    pub status: Option<TempStatus>,
}

/// A classified bus message
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `@A D` date-sync acknowledgment
    DateAck,
    /// `@A O` unsolicited logout acknowledgment
    LogoutAck,
    /// `@A P ...` login acknowledgment
    LoginAck,
    /// `@A {T} {id}` action acknowledgment
    Ack { entity: EntityType, id: u32 },
    /// `@N ...` negative acknowledgment
    Nack(Nack),
    /// `@I L {id} {0-100}`
    Light { id: u32, brightness: u8 },
    /// `@I R {id} {O|C}`
    Switch { id: u32, state: SwitchState },
    /// `@I C {id} {position}`, position passed through verbatim
    Cover { id: u32, position: String },
    /// `@I H {id} {heat} {cool} {fan} {mode}`
    Hvac { id: u32, report: HvacReport },
    /// `@I T {id} {value} {status}`
    Temperature { id: u32, reading: TemperatureReading },
    /// `@I S {id} {A|D}`
    Security { id: u32, state: SecurityState },
    /// `@I Z 1 {one char per zone}`
    Zones { states: String },
    /// `@I B 1 {one char per zone}`
    Bypass { states: String },
    /// `@I N {T} {id} {name}`
    Name { entity: EntityType, id: u32, name: String },
    /// `@I V ...` firmware version banner
    Version(String),
    /// Anything that does not match a known layout
    Unrecognized { message: String, reason: String },
}

impl Event {
    /// Entity a state event refers to
    pub fn entity(&self) -> Option<EntityRef> {
        match self {
            Event::Light { id, .. } => Some(EntityRef::new(EntityType::Light, *id)),
            Event::Switch { id, .. } => Some(EntityRef::new(EntityType::Switch, *id)),
            Event::Cover { id, .. } => Some(EntityRef::new(EntityType::Cover, *id)),
            Event::Hvac { id, .. } => Some(EntityRef::new(EntityType::Hvac, *id)),
            Event::Temperature { id, .. } => Some(EntityRef::new(EntityType::Temperature, *id)),
            Event::Security { id, .. } => Some(EntityRef::new(EntityType::Security, *id)),
            Event::Zones { .. } => Some(EntityRef::new(EntityType::Zone, 1)),
            Event::Bypass { .. } => Some(EntityRef::new(EntityType::ZoneBypass, 1)),
            _ => None,
        }
    }
}

/// Reason a sub-parser rejected a message
type Rejection = String;

/// Classify a framed message
///
/// Never fails: messages that match no known layout become
/// [`Event::Unrecognized`] carrying the reason.
pub fn classify(message: &BusMessage) -> Event {
    let result = match message.class() {
        Some(MessageClass::Ack) => classify_ack(message),
        Some(MessageClass::Nack) if message.len() >= 3 => Ok(Event::Nack(parse_nack(message))),
        Some(MessageClass::Info) => classify_info(message),
        Some(MessageClass::Set) | Some(MessageClass::Get) => {
            Err("outbound command echoed on the bus".to_string())
        }
        Some(MessageClass::Nack) => Err("negative acknowledgment too short".to_string()),
        None => Err("unknown message marker".to_string()),
    };

    result.unwrap_or_else(|reason| Event::Unrecognized {
        message: message.raw(),
        reason,
    })
}

fn classify_ack(message: &BusMessage) -> Result<Event, Rejection> {
    match (message.len(), message.token(1)) {
        (_, Some("P")) => Ok(Event::LoginAck),
        (2, Some("D")) => Ok(Event::DateAck),
        (2, Some("O")) => Ok(Event::LogoutAck),
        (3, Some(code)) => {
            let entity = EntityType::from_code(code)
                .ok_or_else(|| format!("unknown ack object {:?}", code))?;
            let id = parse_id(message, 2)?;
            Ok(Event::Ack { entity, id })
        }
        _ => Err("unexpected acknowledgment layout".to_string()),
    }
}

fn parse_nack(message: &BusMessage) -> Nack {
    let code = message.token(3).and_then(|t| t.parse::<u8>().ok());
    Nack {
        object: message.token(1).unwrap_or_default().to_string(),
        id: message.token(2).and_then(|t| t.parse().ok()),
        code,
        description: nack_description(code),
        raw: message.raw(),
    }
}

fn classify_info(message: &BusMessage) -> Result<Event, Rejection> {
    if message.token(1) == Some("V") {
        return Ok(Event::Version(message.tokens()[2..].join(" ")));
    }
    if message.len() < 4 {
        return Err("info message too short".to_string());
    }

    let kind = message.token(1).unwrap_or_default();
    if kind == "N" {
        return parse_name(message);
    }

    let entity =
        EntityType::from_code(kind).ok_or_else(|| format!("unknown info type {:?}", kind))?;
    let id = parse_id(message, 2)?;
    let value = message.token(3).unwrap_or_default();

    match entity {
        EntityType::Light => {
            let brightness = value
                .parse::<u8>()
                .map_err(|_| format!("invalid light level {:?}", value))?;
            Ok(Event::Light { id, brightness })
        }
        EntityType::Switch => {
            let state = SwitchState::from_code(value)
                .ok_or_else(|| format!("invalid switch state {:?}", value))?;
            Ok(Event::Switch { id, state })
        }
        EntityType::Cover => Ok(Event::Cover {
            id,
            position: value.to_string(),
        }),
        EntityType::Hvac => parse_hvac(message, id),
        EntityType::Temperature => {
            let value = value
                .parse::<f32>()
                .map_err(|_| format!("invalid temperature {:?}", value))?;
            let status = message.token(4).and_then(TempStatus::from_code);
            Ok(Event::Temperature {
                id,
                reading: TemperatureReading { value, status },
            })
        }
        EntityType::Security => {
            let state = SecurityState::from_code(value)
                .ok_or_else(|| format!("invalid security state {:?}", value))?;
            Ok(Event::Security { id, state })
        }
        EntityType::Zone => Ok(Event::Zones {
            states: value.to_string(),
        }),
        EntityType::ZoneBypass => Ok(Event::Bypass {
            states: value.to_string(),
        }),
    }
}

fn parse_hvac(message: &BusMessage, id: u32) -> Result<Event, Rejection> {
    if message.len() < 7 {
        return Err("HVAC report needs 7 tokens".to_string());
    }
    let setpoint = |index: usize| -> Result<f32, Rejection> {
        let token = message.token(index).unwrap_or_default();
        token
            .parse::<f32>()
            .map_err(|_| format!("invalid setpoint {:?}", token))
    };
    let fan_code = message.token(5).unwrap_or_default();
    let mode_code = message.token(6).unwrap_or_default();

    Ok(Event::Hvac {
        id,
        report: HvacReport {
            heating_setpoint: setpoint(3)?,
            cooling_setpoint: setpoint(4)?,
            fan: FanState::from_code(fan_code)
                .ok_or_else(|| format!("invalid fan code {:?}", fan_code))?,
            mode: HvacMode::from_code(mode_code)
                .ok_or_else(|| format!("invalid HVAC mode {:?}", mode_code))?,
        },
    })
}

fn parse_name(message: &BusMessage) -> Result<Event, Rejection> {
    let code = message.token(2).unwrap_or_default();
    let entity =
        EntityType::from_code(code).ok_or_else(|| format!("unknown name type {:?}", code))?;
    let id = parse_id(message, 3)?;
    let name = message.tokens()[4..].join(" ");
    Ok(Event::Name { entity, id, name })
}

fn parse_id(message: &BusMessage, index: usize) -> Result<u32, Rejection> {
    let token = message.token(index).unwrap_or_default();
    token
        .parse::<u32>()
        .map_err(|_| format!("invalid object id {:?}", token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(text: &str) -> Event {
        classify(&BusMessage::parse(text))
    }

    #[test]
    fn test_acks() {
        assert_eq!(event("@A D"), Event::DateAck);
        assert_eq!(event("@A O"), Event::LogoutAck);
        assert_eq!(event("@A P"), Event::LoginAck);
        assert_eq!(event("@A P I 00000"), Event::LoginAck);
        assert_eq!(
            event("@A L 7"),
            Event::Ack {
                entity: EntityType::Light,
                id: 7
            }
        );
        assert_eq!(
            event("@A B 1"),
            Event::Ack {
                entity: EntityType::ZoneBypass,
                id: 1
            }
        );
        assert!(matches!(event("@A Q 1"), Event::Unrecognized { .. }));
        assert!(matches!(event("@A"), Event::Unrecognized { .. }));
    }

    #[test]
    fn test_nack_security_code() {
        match event("@N S 1 4") {
            Event::Nack(nack) => {
                assert_eq!(nack.code, Some(4));
                assert_eq!(nack.object, "S");
                assert_eq!(nack.id, Some(1));
                assert!(nack.description.contains("Security code is not valid"));
                assert_eq!(nack.raw, "@N S 1 4");
            }
            other => panic!("expected nack, got {:?}", other),
        }
    }

    #[test]
    fn test_nack_code_table() {
        for code in (1..=8).chain(16..=18) {
            assert_ne!(nack_description(Some(code)), "Unknown error code", "code {}", code);
        }
        assert_eq!(nack_description(Some(9)), "Unknown error code");
        assert_eq!(nack_description(None), "Unknown error code");

        match event("@N L 3") {
            Event::Nack(nack) => assert_eq!(nack.description, "Unknown error code"),
            other => panic!("expected nack, got {:?}", other),
        }
    }

    #[test]
    fn test_light_and_switch() {
        assert_eq!(event("@I L 3 100"), Event::Light { id: 3, brightness: 100 });
        assert_eq!(event("@I L 4 0"), Event::Light { id: 4, brightness: 0 });
        assert_eq!(
            event("@I R 5 O"),
            Event::Switch {
                id: 5,
                state: SwitchState::On
            }
        );
        assert_eq!(
            event("@I R 5 C"),
            Event::Switch {
                id: 5,
                state: SwitchState::Off
            }
        );
        assert!(matches!(event("@I L x 10"), Event::Unrecognized { .. }));
        assert!(matches!(event("@I R 5 Q"), Event::Unrecognized { .. }));
    }

    #[test]
    fn test_cover_position_is_verbatim() {
        assert_eq!(
            event("@I C 2 045"),
            Event::Cover {
                id: 2,
                position: "045".to_string()
            }
        );
    }

    #[test]
    fn test_hvac_report() {
        assert_eq!(
            event("@I H 1 20.5 25 R C"),
            Event::Hvac {
                id: 1,
                report: HvacReport {
                    heating_setpoint: 20.5,
                    cooling_setpoint: 25.0,
                    fan: FanState::On,
                    mode: HvacMode::Cool,
                }
            }
        );
        assert!(matches!(event("@I H 1 20 25 R"), Event::Unrecognized { .. }));
        assert!(matches!(event("@I H 1 20 25 X C"), Event::Unrecognized { .. }));
    }

    #[test]
    fn test_temperature() {
        assert_eq!(
            event("@I T 2 21.5 H"),
            Event::Temperature {
                id: 2,
                reading: TemperatureReading {
                    value: 21.5,
                    status: Some(TempStatus::Heat)
                }
            }
        );
        assert_eq!(
            event("@I T 2 18"),
            Event::Temperature {
                id: 2,
                reading: TemperatureReading {
                    value: 18.0,
                    status: None
                }
            }
        );
    }

    #[test]
    fn test_security_zones_bypass() {
        assert_eq!(
            event("@I S 1 A"),
            Event::Security {
                id: 1,
                state: SecurityState::ArmedAway
            }
        );
        assert_eq!(
            event("@I Z 1 NNOCE"),
            Event::Zones {
                states: "NNOCE".to_string()
            }
        );
        assert_eq!(
            event("@I B 1 NYNN"),
            Event::Bypass {
                states: "NYNN".to_string()
            }
        );
    }

    #[test]
    fn test_name_and_version() {
        assert_eq!(
            event("@I N L 3 Kitchen ceiling"),
            Event::Name {
                entity: EntityType::Light,
                id: 3,
                name: "Kitchen ceiling".to_string()
            }
        );
        assert_eq!(event("@I V 2.1 2009"), Event::Version("2.1 2009".to_string()));
    }

    #[test]
    fn test_unrecognized() {
        assert!(matches!(event("@X 1 2"), Event::Unrecognized { .. }));
        assert!(matches!(event("@I Q 1 2"), Event::Unrecognized { .. }));
        assert!(matches!(event("@I L 3"), Event::Unrecognized { .. }));
        assert!(matches!(event("@S L 1 100"), Event::Unrecognized { .. }));
        assert!(matches!(event("hello"), Event::Unrecognized { .. }));
    }

    #[test]
    fn test_event_entity() {
        assert_eq!(
            event("@I L 3 1").entity(),
            Some(EntityRef::new(EntityType::Light, 3))
        );
        assert_eq!(
            event("@I B 1 NN").entity(),
            Some(EntityRef::new(EntityType::ZoneBypass, 1))
        );
        assert_eq!(event("@A D").entity(), None);
    }
}
