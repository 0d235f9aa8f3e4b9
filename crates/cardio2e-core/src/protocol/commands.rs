//! Outbound commands
//!
//! Every command is a single `@`-prefixed line terminated by a carriage
//! return. Setpoints and other values are rendered exactly as the
//! controller prints them so state echoes compare equal.

use chrono::NaiveDateTime;
use std::fmt;

use super::TERMINATOR;
use crate::entity::{format_setpoint, EntityType, HvacSetpoint};

/// Date layout of the `@S D` command
pub const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// A command the gateway can send to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `@S P I {password}`
    Login { password: String },
    /// `@S P O`
    Logout,
    /// `@S {T} {id} {value}`; the value is omitted for a bare trigger
    Set {
        entity: EntityType,
        id: u32,
        value: Option<String>,
    },
    /// `@S H {id} {heat} {cool} {fan} {mode}`
    SetHvac { id: u32, setpoint: HvacSetpoint },
    /// `@S D {YYYYMMDDHHMMSS}`
    Date(NaiveDateTime),
    /// `@G {T} {id}`
    Get { entity: EntityType, id: u32 },
    /// `@G N {T} {id}`
    GetName { entity: EntityType, id: u32 },
}

impl Command {
    /// Set command carrying a value
    pub fn set(entity: EntityType, id: u32, value: impl Into<String>) -> Self {
        Command::Set {
            entity,
            id,
            value: Some(value.into()),
        }
    }

    /// State query; zone-wide types always address id 1
    pub fn get(entity: EntityType, id: u32) -> Self {
        let id = if entity.is_zone_wide() { 1 } else { id };
        Command::Get { entity, id }
    }

    /// Date sync for the given local time
    pub fn date(now: NaiveDateTime) -> Self {
        Command::Date(now)
    }

    /// Command text without the terminator
    pub fn encode(&self) -> String {
        match self {
            Command::Login { password } => format!("@S P I {}", password),
            Command::Logout => "@S P O".to_string(),
            Command::Set {
                entity,
                id,
                value: Some(value),
            } => format!("@S {} {} {}", entity, id, value),
            Command::Set {
                entity,
                id,
                value: None,
            } => format!("@S {} {}", entity, id),
            Command::SetHvac { id, setpoint } => format!(
                "@S H {} {} {} {} {}",
                id,
                format_setpoint(setpoint.heating_setpoint),
                format_setpoint(setpoint.cooling_setpoint),
                setpoint.fan.code(),
                setpoint.mode.code()
            ),
            Command::Date(at) => format!("@S D {}", at.format(DATE_FORMAT)),
            Command::Get { entity, id } => format!("@G {} {}", entity, id),
            Command::GetName { entity, id } => format!("@G N {} {}", entity, id),
        }
    }

    /// Bytes to write, terminator included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut line = self.encode();
        line.push(TERMINATOR);
        line.into_bytes()
    }

    /// Leading text of the `@I` line that answers this command, if any
    pub fn response_prefix(&self) -> Option<String> {
        match self {
            Command::Get { entity, .. } => Some(format!("@I {} ", entity)),
            Command::GetName { entity, .. } => Some(format!("@I N {}", entity)),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Keep the password out of logs
            Command::Login { .. } => f.write_str("@S P I *****"),
            other => f.write_str(&other.encode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FanState, HvacMode, HvacRecord, HvacSetting};
    use crate::protocol::{classify, BusMessage, Event};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_session_commands() {
        let login = Command::Login {
            password: "00000".to_string(),
        };
        assert_eq!(login.to_bytes(), b"@S P I 00000\r".to_vec());
        assert_eq!(login.to_string(), "@S P I *****");
        assert_eq!(Command::Logout.to_bytes(), b"@S P O\r".to_vec());
    }

    #[test]
    fn test_set_commands() {
        assert_eq!(Command::set(EntityType::Light, 3, "100").encode(), "@S L 3 100");
        assert_eq!(Command::set(EntityType::Switch, 5, "C").encode(), "@S R 5 C");
        assert_eq!(
            Command::set(EntityType::Security, 1, "A 12345").encode(),
            "@S S 1 A 12345"
        );
        assert_eq!(
            Command::set(EntityType::ZoneBypass, 1, "NNYN").encode(),
            "@S B 1 NNYN"
        );
        let bare = Command::Set {
            entity: EntityType::Cover,
            id: 2,
            value: None,
        };
        assert_eq!(bare.encode(), "@S C 2");
    }

    #[test]
    fn test_queries() {
        assert_eq!(Command::get(EntityType::Light, 7).encode(), "@G L 7");
        assert_eq!(Command::get(EntityType::Zone, 9).encode(), "@G Z 1");
        assert_eq!(Command::get(EntityType::ZoneBypass, 4).encode(), "@G B 1");
        let name = Command::GetName {
            entity: EntityType::Hvac,
            id: 2,
        };
        assert_eq!(name.encode(), "@G N H 2");
        assert_eq!(name.response_prefix().as_deref(), Some("@I N H"));
        assert_eq!(
            Command::get(EntityType::Cover, 1).response_prefix().as_deref(),
            Some("@I C ")
        );
        assert_eq!(Command::Logout.response_prefix(), None);
    }

    #[test]
    fn test_date_command() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();
        assert_eq!(Command::date(at).to_bytes(), b"@S D 20240309070501\r".to_vec());
    }

    #[test]
    fn test_hvac_encoding_matches_report_parsing() {
        let mut record = HvacRecord::default();
        record.apply_setting(HvacSetting::HeatingSetpoint(20.0));
        record.apply_setting(HvacSetting::CoolingSetpoint(24.5));
        record.apply_setting(HvacSetting::Fan(FanState::On));
        record.apply_setting(HvacSetting::Mode(HvacMode::Cool));

        let command = Command::SetHvac {
            id: 1,
            setpoint: record.setpoint().unwrap(),
        };
        let encoded = command.encode();
        assert_eq!(encoded, "@S H 1 20 24.5 R C");

        let echo = encoded.replacen("@S", "@I", 1);
        match classify(&BusMessage::parse(&echo)) {
            Event::Hvac { id, report } => {
                assert_eq!(id, 1);
                assert_eq!(report.mode, HvacMode::Cool);
                assert_eq!(report.fan, FanState::On);
                assert_eq!(report.mode.as_str(), "cool");
                assert_eq!(report.fan.as_str(), "on");
                assert_eq!(report.cooling_setpoint, 24.5);
            }
            other => panic!("expected HVAC report, got {:?}", other),
        }
    }
}
