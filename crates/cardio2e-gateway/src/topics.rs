//! MQTT topic layout
//!
//! Outbound state topics are built here; inbound command topics are parsed
//! into [`Inbound`].

use cardio2e_core::entity::EntityType;

/// Root of every gateway topic
pub const ROOT: &str = "cardio2e";

/// Availability topic (also the last will)
pub const AVAILABILITY: &str = "cardio2e/status";
pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

pub const ERRORS_STATE: &str = "cardio2e/errors/state";
pub const HEARTBEAT: &str = "cardio2e/heartbeat";
pub const DIAGNOSTICS_STATE: &str = "cardio2e/diagnostics/state";

/// Payload published to the error topic once the bus is healthy
pub const NO_ERRORS: &str = "No errors.";

/// Command topics subscribed on every (re)connect
pub const SUBSCRIPTIONS: [&str; 7] = [
    "cardio2e/light/set/#",
    "cardio2e/switch/set/#",
    "cardio2e/cover/set/#",
    "cardio2e/cover/command/#",
    "cardio2e/hvac/+/set/#",
    "cardio2e/alarm/set/#",
    "cardio2e/zone/bypass/set/#",
];

pub fn light_state(id: u32) -> String {
    format!("{}/light/state/{}", ROOT, id)
}

pub fn light_brightness(id: u32) -> String {
    format!("{}/light/brightness/{}", ROOT, id)
}

pub fn light_set(id: u32) -> String {
    format!("{}/light/set/{}", ROOT, id)
}

pub fn switch_state(id: u32) -> String {
    format!("{}/switch/state/{}", ROOT, id)
}

pub fn switch_set(id: u32) -> String {
    format!("{}/switch/set/{}", ROOT, id)
}

pub fn cover_state(id: u32) -> String {
    format!("{}/cover/state/{}", ROOT, id)
}

pub fn cover_set(id: u32) -> String {
    format!("{}/cover/set/{}", ROOT, id)
}

pub fn cover_command(id: u32) -> String {
    format!("{}/cover/command/{}", ROOT, id)
}

pub fn hvac_state(id: u32, field: &str) -> String {
    format!("{}/hvac/{}/state/{}", ROOT, id, field)
}

pub fn hvac_set(id: u32, field: &str) -> String {
    format!("{}/hvac/{}/set/{}", ROOT, id, field)
}

pub fn alarm_state(id: u32) -> String {
    format!("{}/alarm/state/{}", ROOT, id)
}

pub fn alarm_set(id: u32) -> String {
    format!("{}/alarm/set/{}", ROOT, id)
}

pub fn zone_state(id: u32) -> String {
    format!("{}/zone/state/{}", ROOT, id)
}

pub fn bypass_state(id: u32) -> String {
    format!("{}/zone/bypass/state/{}", ROOT, id)
}

pub fn bypass_set(id: u32) -> String {
    format!("{}/zone/bypass/set/{}", ROOT, id)
}

/// Topic segment of an entity type, if it has its own namespace
pub fn segment(entity: EntityType) -> Option<&'static str> {
    match entity {
        EntityType::Light => Some("light"),
        EntityType::Switch => Some("switch"),
        EntityType::Cover => Some("cover"),
        EntityType::Hvac => Some("hvac"),
        EntityType::Security => Some("alarm"),
        EntityType::Zone => Some("zone"),
        EntityType::Temperature | EntityType::ZoneBypass => None,
    }
}

/// Where the fetched name of an entity is published
pub fn name(entity: EntityType, id: u32) -> Option<String> {
    segment(entity).map(|seg| format!("{}/{}/name/{}", ROOT, seg, id))
}

/// A recognized inbound command topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Light(u32),
    Switch(u32),
    CoverPosition(u32),
    CoverCommand(u32),
    Hvac { id: u32, field: String },
    Alarm(u32),
    Bypass(u32),
}

/// Parse a command topic; `None` for anything outside the layout
pub fn parse_inbound(topic: &str) -> Option<Inbound> {
    let parts: Vec<&str> = topic.split('/').collect();
    let id = |s: &str| s.parse::<u32>().ok().filter(|id| *id > 0);

    match parts.as_slice() {
        [ROOT, "light", "set", n] => id(*n).map(Inbound::Light),
        [ROOT, "switch", "set", n] => id(*n).map(Inbound::Switch),
        [ROOT, "cover", "set", n] => id(*n).map(Inbound::CoverPosition),
        [ROOT, "cover", "command", n] => id(*n).map(Inbound::CoverCommand),
        [ROOT, "hvac", n, "set", field] if !field.is_empty() => id(*n).map(|id| Inbound::Hvac {
            id,
            field: field.to_string(),
        }),
        [ROOT, "alarm", "set", n] => id(*n).map(Inbound::Alarm),
        [ROOT, "zone", "bypass", "set", n] => id(*n).map(Inbound::Bypass),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound() {
        assert_eq!(parse_inbound("cardio2e/light/set/3"), Some(Inbound::Light(3)));
        assert_eq!(parse_inbound("cardio2e/switch/set/12"), Some(Inbound::Switch(12)));
        assert_eq!(
            parse_inbound("cardio2e/cover/command/2"),
            Some(Inbound::CoverCommand(2))
        );
        assert_eq!(
            parse_inbound("cardio2e/hvac/1/set/mode"),
            Some(Inbound::Hvac {
                id: 1,
                field: "mode".to_string()
            })
        );
        assert_eq!(parse_inbound("cardio2e/alarm/set/1"), Some(Inbound::Alarm(1)));
        assert_eq!(
            parse_inbound("cardio2e/zone/bypass/set/5"),
            Some(Inbound::Bypass(5))
        );
    }

    #[test]
    fn test_parse_inbound_rejects_foreign_topics() {
        assert_eq!(parse_inbound("cardio2e/light/state/3"), None);
        assert_eq!(parse_inbound("cardio2e/light/set/x"), None);
        assert_eq!(parse_inbound("cardio2e/light/set/0"), None);
        assert_eq!(parse_inbound("other/light/set/1"), None);
        assert_eq!(parse_inbound("cardio2e/hvac/1/set/"), None);
    }

    #[test]
    fn test_builders_match_subscriptions() {
        assert_eq!(light_set(4), "cardio2e/light/set/4");
        assert_eq!(hvac_state(2, "fan"), "cardio2e/hvac/2/state/fan");
        assert_eq!(bypass_state(7), "cardio2e/zone/bypass/state/7");
        assert_eq!(
            name(EntityType::Hvac, 1).as_deref(),
            Some("cardio2e/hvac/name/1")
        );
        assert_eq!(name(EntityType::ZoneBypass, 1), None);

        let commands = [
            light_set(1),
            switch_set(1),
            cover_set(1),
            cover_command(1),
            alarm_set(1),
            bypass_set(1),
        ];
        for topic in commands {
            assert!(parse_inbound(&topic).is_some(), "{}", topic);
        }
        assert!(parse_inbound(&hvac_set(1, "heating_setpoint")).is_some());
    }
}
