//! Bus events to MQTT
//!
//! [`MqttBridge`] is the gateway's [`BusHandler`]: every decoded bus event
//! becomes one or more retained state publishes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, Utc};
use serde_json::json;
use tracing::{debug, info};

use cardio2e_core::entity::{
    format_setpoint, BypassState, EntityRef, EntityType, HvacRecord, HvacSetting, SecurityState,
    SwitchState, ZoneState,
};
use cardio2e_core::protocol::{BusHandler, Nack, TemperatureReading};
use cardio2e_core::state::{Diagnostics, GatewayState};

use crate::discovery::Discovery;
use crate::publisher::Publisher;
use crate::topics;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// MQTT payload of a single HVAC field
pub fn hvac_setting_payload(setting: &HvacSetting) -> String {
    match setting {
        HvacSetting::HeatingSetpoint(v) | HvacSetting::CoolingSetpoint(v) => format_setpoint(*v),
        HvacSetting::Fan(fan) => fan.as_str().to_string(),
        HvacSetting::Mode(mode) => mode.as_str().to_string(),
    }
}

/// Publish the error topic
pub fn publish_error(publisher: &dyn Publisher, error: &str) {
    let payload = json!({
        "error": error,
        "timestamp": Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string(),
    });
    publisher.publish(topics::ERRORS_STATE, &payload.to_string(), true);
    info!("Published error state: {}", error);
}

/// Publishes bus state to MQTT
pub struct MqttBridge {
    publisher: Arc<dyn Publisher>,
    state: Arc<GatewayState>,
    discovery: Discovery,
    dimmers: Vec<u32>,
    announced: HashSet<EntityRef>,
}

impl MqttBridge {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        state: Arc<GatewayState>,
        discovery: Discovery,
        dimmers: Vec<u32>,
    ) -> Self {
        Self {
            publisher,
            state,
            discovery,
            dimmers,
            announced: HashSet::new(),
        }
    }

    pub fn publisher(&self) -> &dyn Publisher {
        self.publisher.as_ref()
    }

    /// Whether the login burst already reported this entity
    pub fn was_announced(&self, entity: EntityType, id: u32) -> bool {
        let id = if entity.is_zone_wide() { 1 } else { id };
        self.announced.contains(&EntityRef::new(entity, id))
    }

    /// Store a name fetched outside the listener
    pub fn remember_name(&self, entity: EntityType, id: u32, name: &str) {
        self.state.set_entity_name(entity, id, name);
    }

    /// Publish discovery for an entity under its known label
    pub fn publish_discovery(&self, entity: EntityType, id: u32) {
        let label = self.state.entity_label(entity, id);
        let dimmer = entity == EntityType::Light && self.dimmers.contains(&id);
        self.discovery
            .publish_entity(self.publisher(), entity, id, &label, dimmer);
    }

    /// Publish the error and diagnostics sensors
    pub fn publish_system_discovery(&self) {
        self.discovery.publish_system(self.publisher());
    }

    fn publish_hvac_record(&self, id: u32, record: &HvacRecord) {
        let fields = [
            record.heating_setpoint.map(HvacSetting::HeatingSetpoint),
            record.cooling_setpoint.map(HvacSetting::CoolingSetpoint),
            record.fan.map(HvacSetting::Fan),
            record.mode.map(HvacSetting::Mode),
        ];
        for setting in fields.iter().flatten() {
            self.publisher.publish(
                &topics::hvac_state(id, setting.field()),
                &hvac_setting_payload(setting),
                true,
            );
        }
    }
}

impl BusHandler for MqttBridge {
    fn light(&mut self, id: u32, brightness: u8) {
        let on_off = if brightness > 0 { "ON" } else { "OFF" };
        self.publisher.publish(&topics::light_state(id), on_off, true);
        if self.dimmers.contains(&id) {
            self.publisher
                .publish(&topics::light_brightness(id), &brightness.to_string(), true);
        }
        info!("Light {} state published: {} ({})", id, on_off, brightness);
    }

    fn switch(&mut self, id: u32, state: SwitchState) {
        self.publisher
            .publish(&topics::switch_state(id), state.as_str(), true);
        info!("Switch {} state published: {}", id, state.as_str());
    }

    fn cover(&mut self, id: u32, position: &str) {
        self.publisher.publish(&topics::cover_state(id), position, true);
        info!("Cover {} position published: {}", id, position);
    }

    fn hvac(&mut self, id: u32, record: &HvacRecord) {
        self.publish_hvac_record(id, record);
        debug!("HVAC {} state published: {:?}", id, record);
    }

    fn temperature(&mut self, id: u32, reading: &TemperatureReading) {
        self.publisher.publish(
            &topics::hvac_state(id, "current_temperature"),
            &reading.value.to_string(),
            true,
        );
        debug!("HVAC {} temperature published: {}", id, reading.value);
    }

    fn security(&mut self, id: u32, state: SecurityState) {
        self.publisher
            .publish(&topics::alarm_state(id), state.as_str(), true);
        info!("Alarm {} state published: {}", id, state.as_str());
    }

    fn zones(&mut self, zones: &[(u32, ZoneState)]) {
        for (id, state) in zones {
            self.publisher
                .publish(&topics::zone_state(*id), state.as_str(), true);
        }
        debug!("Published {} zone states", zones.len());
    }

    fn bypass(&mut self, zones: &[(u32, BypassState)]) {
        for (id, state) in zones {
            self.publisher
                .publish(&topics::bypass_state(*id), state.as_str(), true);
        }
        debug!("Published {} bypass states", zones.len());
    }

    fn name(&mut self, entity: EntityType, id: u32, name: &str) {
        if let Some(topic) = topics::name(entity, id) {
            self.publisher.publish(&topic, name, true);
        }
        self.publish_discovery(entity, id);
    }

    fn rejected(&mut self, nack: &Nack) {
        publish_error(self.publisher(), &nack.to_string());
    }

    fn date_synced(&mut self) {
        publish_error(self.publisher(), topics::NO_ERRORS);
    }

    fn heartbeat(&mut self, diagnostics: &Diagnostics) {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.publisher.publish(topics::HEARTBEAT, &timestamp, false);

        let mut payload = json!(diagnostics);
        payload["timestamp"] = timestamp.into();
        self.publisher
            .publish(topics::DIAGNOSTICS_STATE, &payload.to_string(), true);
        debug!("Heartbeat published");
    }

    fn announced(&mut self, entity: EntityRef) {
        self.announced.insert(entity);
    }
}
