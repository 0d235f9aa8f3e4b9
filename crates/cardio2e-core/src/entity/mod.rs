//! Bus entities
//!
//! Entity types addressable on the Cardio2e bus and the code tables used to
//! translate their single-letter wire values.

mod hvac;
mod zone;

pub use hvac::{
    format_setpoint, FanState, HvacMode, HvacRecord, HvacReport, HvacSetpoint, HvacSetting,
    SETPOINT_RANGE,
};
pub use zone::{
    decode_bypass, decode_zones, interpret_bypass_character, interpret_zone_character,
    toggle_bypass, BypassState, ZoneConfig, ZoneState, DEFAULT_ZONE_COUNT,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of addressable point on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Light, optionally dimmable ('L')
    Light,
    /// On/off relay ('R')
    Switch,
    /// Blind or shutter ('C')
    Cover,
    /// HVAC unit ('H')
    Hvac,
    /// Temperature sensor attached to an HVAC unit ('T')
    Temperature,
    /// Security panel ('S')
    Security,
    /// All alarm zones at once ('Z')
    Zone,
    /// Bypass flags of all alarm zones at once ('B')
    ZoneBypass,
}

impl EntityType {
    /// All entity types, in wire-code order of the login burst
    pub const ALL: [EntityType; 8] = [
        EntityType::Light,
        EntityType::Switch,
        EntityType::Cover,
        EntityType::Hvac,
        EntityType::Temperature,
        EntityType::Security,
        EntityType::Zone,
        EntityType::ZoneBypass,
    ];

    /// Single-letter wire code
    pub fn code(&self) -> char {
        match self {
            EntityType::Light => 'L',
            EntityType::Switch => 'R',
            EntityType::Cover => 'C',
            EntityType::Hvac => 'H',
            EntityType::Temperature => 'T',
            EntityType::Security => 'S',
            EntityType::Zone => 'Z',
            EntityType::ZoneBypass => 'B',
        }
    }

    /// Parse a wire code token
    pub fn from_code(token: &str) -> Option<Self> {
        match token {
            "L" => Some(EntityType::Light),
            "R" => Some(EntityType::Switch),
            "C" => Some(EntityType::Cover),
            "H" => Some(EntityType::Hvac),
            "T" => Some(EntityType::Temperature),
            "S" => Some(EntityType::Security),
            "Z" => Some(EntityType::Zone),
            "B" => Some(EntityType::ZoneBypass),
            _ => None,
        }
    }

    /// Human readable label used in logs and default names
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Light => "Light",
            EntityType::Switch => "Switch",
            EntityType::Cover => "Cover",
            EntityType::Hvac => "HVAC",
            EntityType::Temperature => "Temperature",
            EntityType::Security => "Security",
            EntityType::Zone => "Zone",
            EntityType::ZoneBypass => "Zone bypass",
        }
    }

    /// Whether a single bus message carries the state of every zone
    pub fn is_zone_wide(&self) -> bool {
        matches!(self, EntityType::Zone | EntityType::ZoneBypass)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single controllable or observable point on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type
    pub entity: EntityType,
    /// Bus id, starting at 1
    pub id: u32,
}

impl EntityRef {
    /// Create a new entity reference
    pub fn new(entity: EntityType, id: u32) -> Self {
        Self { entity, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity, self.id)
    }
}

/// Relay state ('O' closed circuit / on, 'C' open circuit / off)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// Parse the wire code
    pub fn from_code(token: &str) -> Option<Self> {
        match token {
            "O" => Some(SwitchState::On),
            "C" => Some(SwitchState::Off),
            _ => None,
        }
    }

    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            SwitchState::On => "O",
            SwitchState::Off => "C",
        }
    }

    /// MQTT payload
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "ON",
            SwitchState::Off => "OFF",
        }
    }
}

/// Alarm panel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityState {
    ArmedAway,
    Disarmed,
}

impl SecurityState {
    /// Parse the wire code
    pub fn from_code(token: &str) -> Option<Self> {
        match token {
            "A" => Some(SecurityState::ArmedAway),
            "D" => Some(SecurityState::Disarmed),
            _ => None,
        }
    }

    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            SecurityState::ArmedAway => "A",
            SecurityState::Disarmed => "D",
        }
    }

    /// MQTT payload (alarm_control_panel state names)
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityState::ArmedAway => "armed_away",
            SecurityState::Disarmed => "disarmed",
        }
    }
}

/// Status flag reported alongside a temperature reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempStatus {
    Heat,
    Cool,
    Off,
}

impl TempStatus {
    /// Parse the wire code
    pub fn from_code(token: &str) -> Option<Self> {
        match token {
            "H" => Some(TempStatus::Heat),
            "C" => Some(TempStatus::Cool),
            "O" => Some(TempStatus::Off),
            _ => None,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            TempStatus::Heat => "heat",
            TempStatus::Cool => "cool",
            TempStatus::Off => "off",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_codes_roundtrip() {
        for entity in EntityType::ALL {
            let code = entity.code().to_string();
            assert_eq!(EntityType::from_code(&code), Some(entity));
        }
        assert_eq!(EntityType::from_code("X"), None);
        assert_eq!(EntityType::from_code("LL"), None);
    }

    #[test]
    fn test_entity_ref_display() {
        let r = EntityRef::new(EntityType::Switch, 5);
        assert_eq!(r.to_string(), "R 5");
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(SwitchState::from_code("O"), Some(SwitchState::On));
        assert_eq!(SwitchState::from_code("C"), Some(SwitchState::Off));
        assert_eq!(SwitchState::from_code("X"), None);
        assert_eq!(SecurityState::from_code("A").map(|s| s.as_str()), Some("armed_away"));
        assert_eq!(SecurityState::from_code("D").map(|s| s.as_str()), Some("disarmed"));
        assert_eq!(TempStatus::from_code("O"), Some(TempStatus::Off));
    }
}
