//! Gateway supervisor
//!
//! Opens the port, logs in, initializes every configured entity and runs
//! the listener. When the listener exits (transport closed) the connection
//! is dropped and the whole sequence starts again.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use cardio2e_core::entity::EntityType;
use cardio2e_core::protocol::{BusHandler, Connection, Listener, ProtocolError};
use cardio2e_core::state::GatewayState;

use crate::bridge::MqttBridge;
use crate::commands::{CommandRouter, ConnectionSlot};
use crate::config::Config;
use crate::discovery::Discovery;
use crate::mqtt;
use crate::publisher::Publisher;
use crate::topics;

/// Delay before reopening the port after a failure
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Per-entity types initialized one id at a time, in startup order
const PER_ID: [EntityType; 5] = [
    EntityType::Light,
    EntityType::Switch,
    EntityType::Cover,
    EntityType::Hvac,
    EntityType::Security,
];

/// Run the gateway until the process is killed
pub fn run(config: Config) -> Result<()> {
    let state = Arc::new(GatewayState::new());
    let slot: ConnectionSlot = Arc::new(Mutex::new(None));

    let (client, connection) = mqtt::connect(&config.mqtt);
    let publisher: Arc<dyn Publisher> = Arc::new(client.clone());
    let router = CommandRouter::new(
        slot.clone(),
        state.clone(),
        publisher.clone(),
        config.cardio2e.alarm_code,
        config.cardio2e.nzones as usize,
    );
    let _mqtt = mqtt::spawn_event_loop(client, connection, router)?;

    loop {
        match session(&config, &state, &slot, &publisher) {
            Ok(()) => info!("Bus session ended"),
            Err(e) => error!("Bus session failed: {}", e),
        }
        slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        publisher.publish(topics::AVAILABILITY, topics::OFFLINE, true);

        info!("Reconnecting in {}s", RECONNECT_DELAY.as_secs());
        thread::sleep(RECONNECT_DELAY);
    }
}

/// One connection lifetime: open, login, initialize, listen
fn session(
    config: &Config,
    state: &Arc<GatewayState>,
    slot: &ConnectionSlot,
    publisher: &Arc<dyn Publisher>,
) -> Result<(), ProtocolError> {
    let conn = Connection::open(
        &config.cardio2e.serial_port,
        config.cardio2e.baudrate,
        config.connection_config(),
    )?;

    let burst = conn.login(&config.cardio2e.password)?;
    info!("Login burst carried {} messages", burst.messages().len());
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn.clone());
    publisher.publish(topics::AVAILABILITY, topics::ONLINE, true);

    let mut listener = Listener::new(conn.clone(), state.clone(), config.listener_config());
    let mut bridge = MqttBridge::new(
        publisher.clone(),
        state.clone(),
        Discovery::new(&config.global.ha_discover_prefix),
        config.cardio2e.dimmer_lights.clone(),
    );

    bridge.publish_system_discovery();
    listener.replay_login(&mut bridge, burst.messages());
    initialize_entities(config, &conn, &mut listener, &mut bridge)?;

    listener.run(&mut bridge);
    conn.close();
    Ok(())
}

/// Fetch names, publish discovery and fetch state of everything configured
///
/// Entities already reported by the login burst are not queried again.
/// Failures on a single entity are logged and skipped; only a closed
/// transport aborts.
pub fn initialize_entities<H: BusHandler + Initializer>(
    config: &Config,
    conn: &Connection,
    listener: &mut Listener,
    handler: &mut H,
) -> Result<(), ProtocolError> {
    for entity in PER_ID {
        for id in 1..=config.entity_count(entity) {
            announce(config, conn, handler, entity, id)?;

            if config.skip_init_state(entity) {
                debug!("Skipping initial state of {} {}", entity.label(), id);
            } else {
                fetch_state(conn, listener, handler, entity, id)?;
            }
            if entity == EntityType::Hvac {
                fetch_state(conn, listener, handler, EntityType::Temperature, id)?;
            }
        }
    }

    let zones = config.entity_count(EntityType::Zone);
    for id in 1..=zones {
        announce(config, conn, handler, EntityType::Zone, id)?;
    }
    if zones > 0 {
        fetch_state(conn, listener, handler, EntityType::Zone, 1)?;
        fetch_state(conn, listener, handler, EntityType::ZoneBypass, 1)?;
    }

    info!("Entity initialization complete");
    Ok(())
}

/// Fetch the name if configured, then publish discovery
fn announce<H: Initializer>(
    config: &Config,
    conn: &Connection,
    handler: &mut H,
    entity: EntityType,
    id: u32,
) -> Result<(), ProtocolError> {
    if config.fetch_names(entity) {
        match conn.query_name(entity, id) {
            Ok(name) => {
                info!("{} {} is named {:?}", entity.label(), id, name);
                handler.named(entity, id, &name);
                return Ok(());
            }
            Err(ProtocolError::NotConnected) => return Err(ProtocolError::NotConnected),
            Err(e) => warn!("No name for {} {}: {}", entity.label(), id, e),
        }
    }
    handler.discover(entity, id);
    Ok(())
}

/// Query and dispatch the state of one entity unless the login burst
/// already reported it
fn fetch_state<H: BusHandler + Initializer>(
    conn: &Connection,
    listener: &mut Listener,
    handler: &mut H,
    entity: EntityType,
    id: u32,
) -> Result<(), ProtocolError> {
    if handler.announced_before(entity, id) {
        debug!("{} {} already reported at login", entity.label(), id);
        return Ok(());
    }
    match conn.query(entity, id) {
        Ok(answer) => {
            listener.dispatch(handler, &answer);
            Ok(())
        }
        Err(ProtocolError::NotConnected) => Err(ProtocolError::NotConnected),
        Err(e) => {
            warn!("No state for {} {}: {}", entity.label(), id, e);
            Ok(())
        }
    }
}

/// What startup initialization needs from the bus handler beyond events
pub trait Initializer {
    /// A name was fetched; store it and publish it with discovery
    fn named(&mut self, entity: EntityType, id: u32, name: &str);

    /// Publish discovery under the default label
    fn discover(&mut self, entity: EntityType, id: u32);

    /// Whether the login burst already reported the entity's state
    fn announced_before(&self, entity: EntityType, id: u32) -> bool;
}

impl Initializer for MqttBridge {
    fn named(&mut self, entity: EntityType, id: u32, name: &str) {
        self.remember_name(entity, id, name);
        BusHandler::name(self, entity, id, name);
    }

    fn discover(&mut self, entity: EntityType, id: u32) {
        self.publish_discovery(entity, id);
    }

    fn announced_before(&self, entity: EntityType, id: u32) -> bool {
        self.was_announced(entity, id)
    }
}
