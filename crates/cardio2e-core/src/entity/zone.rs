//! Alarm zones and zone bypass
//!
//! Zone and bypass messages carry one character per zone, positionally
//! 1-indexed, for every zone at once.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::protocol::ProtocolError;

/// Default number of alarm zones on a Cardio2e panel
pub const DEFAULT_ZONE_COUNT: usize = 16;

/// Decoded state of one alarm zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneState {
    /// Active / open
    On,
    /// Inactive / closed
    Off,
    /// Zone fault reported by the panel
    Error,
    /// Character not part of the zone alphabet
    Unknown,
}

impl ZoneState {
    /// MQTT payload
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneState::On => "ON",
            ZoneState::Off => "OFF",
            ZoneState::Error => "ERROR",
            ZoneState::Unknown => "UNKNOWN",
        }
    }
}

/// Decoded bypass flag of one alarm zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BypassState {
    /// Zone excluded from alarm evaluation ('Y')
    On,
    /// Zone armed normally ('N')
    Off,
    Unknown,
}

impl BypassState {
    /// MQTT payload
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassState::On => "ON",
            BypassState::Off => "OFF",
            BypassState::Unknown => "UNKNOWN",
        }
    }
}

/// Zone layout of the installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Number of zones wired on the panel
    pub zone_count: usize,
    /// Zones whose active/inactive reading is flipped (normally-closed sensors)
    pub inverted: Vec<u32>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            zone_count: DEFAULT_ZONE_COUNT,
            inverted: Vec::new(),
        }
    }
}

/// Interpret one zone character
///
/// `O` is active, `N` and `C` are inactive, `E` is a fault. Zones listed in
/// `inverted` swap active and inactive.
pub fn interpret_zone_character(character: char, zone_id: u32, inverted: &[u32]) -> ZoneState {
    let is_inverted = inverted.contains(&zone_id);
    match character {
        'O' => {
            if is_inverted {
                ZoneState::Off
            } else {
                ZoneState::On
            }
        }
        'N' | 'C' => {
            if is_inverted {
                ZoneState::On
            } else {
                ZoneState::Off
            }
        }
        'E' => ZoneState::Error,
        _ => ZoneState::Unknown,
    }
}

/// Interpret one bypass character
pub fn interpret_bypass_character(character: char) -> BypassState {
    match character {
        'Y' => BypassState::On,
        'N' => BypassState::Off,
        _ => BypassState::Unknown,
    }
}

/// Decode a zone state string, at most `zone_count` zones
pub fn decode_zones(states: &str, config: &ZoneConfig) -> Vec<(u32, ZoneState)> {
    states
        .chars()
        .take(config.zone_count)
        .zip(1u32..)
        .map(|(c, zone_id)| (zone_id, interpret_zone_character(c, zone_id, &config.inverted)))
        .collect()
}

/// Decode a bypass string, at most `zone_count` zones
pub fn decode_bypass(states: &str, zone_count: usize) -> Vec<(u32, BypassState)> {
    states
        .chars()
        .take(zone_count)
        .zip(1u32..)
        .map(|(c, zone_id)| (zone_id, interpret_bypass_character(c)))
        .collect()
}

/// Compute the full bypass string after toggling one zone
///
/// A snapshot whose length differs from `zone_count` (never received, or
/// malformed) is reset to all-`N` before the toggle is applied.
pub fn toggle_bypass(
    snapshot: &str,
    zone_id: u32,
    bypassed: bool,
    zone_count: usize,
) -> Result<String, ProtocolError> {
    if zone_id == 0 || zone_id as usize > zone_count {
        return Err(ProtocolError::InvalidCommand(format!(
            "zone {} is outside 1..={}",
            zone_id, zone_count
        )));
    }

    let mut flags: Vec<char> = if snapshot.chars().count() == zone_count {
        snapshot.chars().collect()
    } else {
        warn!(
            "Bypass snapshot {:?} does not cover {} zones; resetting to all active",
            snapshot, zone_count
        );
        vec!['N'; zone_count]
    };

    flags[zone_id as usize - 1] = if bypassed { 'Y' } else { 'N' };
    Ok(flags.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_character_rule() {
        assert_eq!(interpret_zone_character('O', 1, &[]), ZoneState::On);
        assert_eq!(interpret_zone_character('O', 1, &[1]), ZoneState::Off);
        assert_eq!(interpret_zone_character('N', 2, &[]), ZoneState::Off);
        assert_eq!(interpret_zone_character('N', 2, &[2]), ZoneState::On);
        assert_eq!(interpret_zone_character('C', 3, &[]), ZoneState::Off);
        assert_eq!(interpret_zone_character('C', 3, &[3]), ZoneState::On);
        assert_eq!(interpret_zone_character('E', 4, &[]), ZoneState::Error);
        assert_eq!(interpret_zone_character('E', 4, &[4]), ZoneState::Error);
        assert_eq!(interpret_zone_character('X', 5, &[]), ZoneState::Unknown);
        assert_eq!(interpret_zone_character('X', 5, &[5]), ZoneState::Unknown);
    }

    #[test]
    fn test_inversion_only_affects_listed_zone() {
        assert_eq!(interpret_zone_character('O', 2, &[1, 3]), ZoneState::On);
    }

    #[test]
    fn test_bypass_character_rule() {
        assert_eq!(interpret_bypass_character('Y'), BypassState::On);
        assert_eq!(interpret_bypass_character('N'), BypassState::Off);
        assert_eq!(interpret_bypass_character('?'), BypassState::Unknown);
    }

    #[test]
    fn test_decode_zones_truncates_to_zone_count() {
        let config = ZoneConfig {
            zone_count: 3,
            inverted: vec![2],
        };
        let zones = decode_zones("OOCE", &config);
        assert_eq!(
            zones,
            vec![(1, ZoneState::On), (2, ZoneState::Off), (3, ZoneState::Off)]
        );
    }

    #[test]
    fn test_toggle_bypass() {
        let next = toggle_bypass("NNNNNNNNNNNNNNNN", 3, true, 16).unwrap();
        assert_eq!(next, "NNYNNNNNNNNNNNNN");

        let cleared = toggle_bypass(&next, 3, false, 16).unwrap();
        assert_eq!(cleared, "NNNNNNNNNNNNNNNN");
    }

    #[test]
    fn test_toggle_bypass_resets_stale_snapshot() {
        let next = toggle_bypass("YYY", 2, true, 8).unwrap();
        assert_eq!(next, "NYNNNNNN");

        let from_empty = toggle_bypass("", 8, true, 8).unwrap();
        assert_eq!(from_empty, "NNNNNNNY");
    }

    #[test]
    fn test_toggle_bypass_rejects_out_of_range_zone() {
        assert!(toggle_bypass("NNNN", 0, true, 4).is_err());
        assert!(toggle_bypass("NNNN", 5, true, 4).is_err());
    }
}
