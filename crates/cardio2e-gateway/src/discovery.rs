//! Home Assistant MQTT discovery payloads
//!
//! Every payload is published retained under the configured discovery
//! prefix and carries the availability block pointing at
//! [`topics::AVAILABILITY`].

use serde_json::{json, Value};
use tracing::{debug, info};

use cardio2e_core::entity::EntityType;

use crate::publisher::Publisher;
use crate::topics;

const MANUFACTURER: &str = "Cardio2e Manufacturer";
const MODEL: &str = "Cardio2e";

fn device(name: &str) -> Value {
    json!({
        "identifiers": [name],
        "name": name,
        "model": MODEL,
        "manufacturer": MANUFACTURER,
    })
}

fn device_for(entity: EntityType) -> Value {
    device(match entity {
        EntityType::Light => "Cardio2e Lights",
        EntityType::Switch => "Cardio2e Switches",
        EntityType::Cover => "Cardio2e Covers",
        EntityType::Hvac | EntityType::Temperature => "Cardio2e HVAC",
        EntityType::Security => "Cardio2e Alarm",
        EntityType::Zone | EntityType::ZoneBypass => "Cardio2e Zones",
    })
}

/// Merge the availability keys and the `device` block into `payload`
fn finish(mut payload: Value, device: Value) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert("device".into(), device);
        map.insert("availability_topic".into(), topics::AVAILABILITY.into());
        map.insert("payload_available".into(), topics::ONLINE.into());
        map.insert("payload_not_available".into(), topics::OFFLINE.into());
    }
    payload
}

/// Builds and publishes discovery documents
#[derive(Debug, Clone)]
pub struct Discovery {
    prefix: String,
}

impl Discovery {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn config_topic(&self, component: &str, object_id: &str) -> String {
        format!("{}/{}/{}/config", self.prefix, component, object_id)
    }

    /// Discovery documents for one entity as `(topic, payload)` pairs
    ///
    /// Zones produce two documents (state sensor and bypass switch); entity
    /// types without a discovery component produce none.
    pub fn entity_configs(
        &self,
        entity: EntityType,
        id: u32,
        name: &str,
        dimmer: bool,
    ) -> Vec<(String, Value)> {
        let device = device_for(entity);
        match entity {
            EntityType::Light => {
                let command_topic = topics::light_set(id);
                let mut payload = json!({
                    "name": name,
                    "unique_id": format!("cardio2e_light_{}", id),
                    "state_topic": topics::light_state(id),
                    "command_topic": command_topic,
                    "payload_on": "ON",
                    "payload_off": "OFF",
                    "qos": 1,
                    "retain": false,
                });
                if let (true, Value::Object(map)) = (dimmer, &mut payload) {
                    map.insert("brightness".into(), true.into());
                    map.insert(
                        "brightness_state_topic".into(),
                        topics::light_brightness(id).into(),
                    );
                    map.insert("brightness_command_topic".into(), command_topic.into());
                    map.insert("brightness_scale".into(), 100.into());
                    map.insert("on_command_type".into(), "brightness".into());
                }
                vec![(
                    self.config_topic("light", &format!("cardio2e_{}", id)),
                    finish(payload, device),
                )]
            }
            EntityType::Switch => vec![(
                self.config_topic("switch", &format!("cardio2e_switch_{}", id)),
                finish(
                    json!({
                        "name": name,
                        "unique_id": format!("cardio2e_switch_{}", id),
                        "command_topic": topics::switch_set(id),
                        "state_topic": topics::switch_state(id),
                        "payload_on": "ON",
                        "payload_off": "OFF",
                        "qos": 1,
                        "retain": false,
                    }),
                    device,
                ),
            )],
            EntityType::Cover => vec![(
                self.config_topic("cover", &format!("cardio2e_cover_{}", id)),
                finish(
                    json!({
                        "name": name,
                        "unique_id": format!("cardio2e_cover_{}", id),
                        "position_topic": topics::cover_state(id),
                        "set_position_topic": topics::cover_set(id),
                        "command_topic": topics::cover_command(id),
                        "payload_open": "OPEN",
                        "payload_close": "CLOSE",
                        "payload_stop": "STOP",
                        "position_open": 100,
                        "position_closed": 0,
                        "optimistic": false,
                        "qos": 1,
                        "retain": false,
                    }),
                    device,
                ),
            )],
            EntityType::Hvac => vec![(
                self.config_topic("climate", &format!("cardio2e_hvac_{}", id)),
                finish(
                    json!({
                        "name": name,
                        "unique_id": format!("cardio2e_hvac_{}", id),
                        "current_temperature_topic": topics::hvac_state(id, "current_temperature"),
                        "temperature_state_topic": topics::hvac_state(id, "cooling_setpoint"),
                        "temperature_command_topic": topics::hvac_set(id, "cooling_setpoint"),
                        "temp_step": "1",
                        "mode_state_topic": topics::hvac_state(id, "mode"),
                        "mode_command_topic": topics::hvac_set(id, "mode"),
                        "modes": ["auto", "heat", "cool", "off"],
                        "fan_mode_state_topic": topics::hvac_state(id, "fan"),
                        "fan_mode_command_topic": topics::hvac_set(id, "fan"),
                        "fan_modes": ["on", "off"],
                        "min_temp": 7,
                        "max_temp": 35,
                        "qos": 1,
                        "retain": false,
                    }),
                    device,
                ),
            )],
            EntityType::Security => vec![(
                self.config_topic("alarm_control_panel", &format!("cardio2e_alarm_{}", id)),
                finish(
                    json!({
                        "name": name,
                        "unique_id": format!("cardio2e_alarm_{}", id),
                        "command_topic": topics::alarm_set(id),
                        "state_topic": topics::alarm_state(id),
                        "payload_arm_away": "armed_away",
                        "payload_disarm": "disarmed",
                        "code_arm_required": false,
                        "code_disarm_required": false,
                        "supported_features": ["arm_away"],
                        "qos": 1,
                        "retain": false,
                    }),
                    device,
                ),
            )],
            EntityType::Zone => vec![
                (
                    self.config_topic("binary_sensor", &format!("cardio2e_zone_{}", id)),
                    finish(
                        json!({
                            "name": name,
                            "unique_id": format!("cardio2e_zone_{}", id),
                            "state_topic": topics::zone_state(id),
                            "payload_on": "ON",
                            "payload_off": "OFF",
                            "device_class": "motion",
                            "qos": 1,
                            "retain": false,
                        }),
                        device.clone(),
                    ),
                ),
                (
                    self.config_topic("switch", &format!("cardio2e_zone_{}_bypass", id)),
                    finish(
                        json!({
                            "name": format!("{} Bypass", name),
                            "unique_id": format!("cardio2e_zone_bypass_{}", id),
                            "state_topic": topics::bypass_state(id),
                            "command_topic": topics::bypass_set(id),
                            "payload_on": "ON",
                            "payload_off": "OFF",
                            "qos": 1,
                            "retain": false,
                        }),
                        device,
                    ),
                ),
            ],
            EntityType::Temperature | EntityType::ZoneBypass => Vec::new(),
        }
    }

    /// Publish the discovery documents of one entity
    pub fn publish_entity(
        &self,
        publisher: &dyn Publisher,
        entity: EntityType,
        id: u32,
        name: &str,
        dimmer: bool,
    ) {
        debug!("Publishing discovery for {} {}", entity.label(), id);
        for (topic, payload) in self.entity_configs(entity, id, name, dimmer) {
            publisher.publish(&topic, &payload.to_string(), true);
        }
        info!("Published discovery config for {}", name);
    }

    /// Sensor exposing the last bus error
    pub fn error_sensor(&self) -> (String, Value) {
        (
            self.config_topic("sensor", "cardio2e_errors"),
            finish(
                json!({
                    "name": "Cardio2e Errors",
                    "unique_id": "cardio2e_error",
                    "state_topic": topics::ERRORS_STATE,
                    "icon": "mdi:alert-circle-outline",
                    "qos": 1,
                    "retain": true,
                    "value_template": "{{ value_json.error }}",
                }),
                device("Cardio2e System Errors"),
            ),
        )
    }

    /// Sensor exposing uptime, with the other counters as attributes
    pub fn diagnostics_sensor(&self) -> (String, Value) {
        (
            self.config_topic("sensor", "cardio2e_diagnostics"),
            finish(
                json!({
                    "name": "Cardio2e Diagnostics",
                    "unique_id": "cardio2e_diagnostics",
                    "state_topic": topics::DIAGNOSTICS_STATE,
                    "icon": "mdi:heart-pulse",
                    "qos": 1,
                    "retain": true,
                    "value_template": "{{ value_json.uptime_seconds }}",
                    "unit_of_measurement": "s",
                    "json_attributes_topic": topics::DIAGNOSTICS_STATE,
                }),
                device("Cardio2e System Errors"),
            ),
        )
    }

    /// Publish the error and diagnostics sensors
    pub fn publish_system(&self, publisher: &dyn Publisher) {
        for (topic, payload) in [self.error_sensor(), self.diagnostics_sensor()] {
            publisher.publish(&topic, &payload.to_string(), true);
        }
        info!("Published discovery config for error and diagnostics sensors");
    }
}
