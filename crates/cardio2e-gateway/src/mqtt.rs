//! MQTT client setup and event loop
//!
//! Two threads share the client. The `mqtt` thread only drives
//! [`Connection::iter`], which is what drains the client's request queue, so
//! nothing on it may block on that queue. Everything that can block
//! (announcing, subscribing, routing commands to the bus) runs on the
//! `mqtt-commands` worker, fed over a channel.

use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, Packet, QoS};
use tracing::{debug, error, info, warn};

use crate::commands::{CommandError, CommandRouter};
use crate::config::MqttConfig;
use crate::topics;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 1000;

/// Work handed from the event loop to the command worker
#[derive(Debug)]
enum Work {
    Connected,
    Command { topic: String, payload: String },
}

/// Build the client options: random client id, credentials when a username
/// is set, and a retained `offline` last will
pub fn options(config: &MqttConfig) -> MqttOptions {
    let client_id = format!("cardio2e-{}", uuid::Uuid::new_v4());
    let mut options = MqttOptions::new(client_id, &config.address, config.port);
    options.set_keep_alive(KEEP_ALIVE);
    if !config.username.is_empty() {
        options.set_credentials(&config.username, &config.password);
    }
    options.set_last_will(LastWill::new(
        topics::AVAILABILITY,
        topics::OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    options
}

/// Create the client; nothing is sent until the event loop runs
pub fn connect(config: &MqttConfig) -> (Client, Connection) {
    info!("Connecting to MQTT broker {}:{}", config.address, config.port);
    Client::new(options(config), REQUEST_CAPACITY)
}

/// Drive the MQTT connection on its own thread
///
/// On every (re)connect the gateway announces itself online and
/// re-subscribes to the command topics. Inbound publishes are routed to the
/// bus by the command worker, in arrival order.
pub fn spawn_event_loop(
    client: Client,
    mut connection: Connection,
    router: CommandRouter,
) -> Result<JoinHandle<()>> {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("mqtt-commands".to_string())
        .spawn(move || run_worker(&client, &router, rx))
        .context("Failed to spawn the MQTT command thread")?;

    thread::Builder::new()
        .name("mqtt".to_string())
        .spawn(move || {
            for notification in connection.iter() {
                let work = match notification {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        Work::Connected
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                        debug!("MQTT <- {} {}", publish.topic, payload);
                        Work::Command {
                            topic: publish.topic,
                            payload,
                        }
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("MQTT connection error: {}", e);
                        thread::sleep(RECONNECT_DELAY);
                        continue;
                    }
                };
                if tx.send(work).is_err() {
                    error!("MQTT command worker is gone");
                    break;
                }
            }
            info!("MQTT event loop finished");
        })
        .context("Failed to spawn the MQTT thread")
}

fn run_worker(client: &Client, router: &CommandRouter, rx: Receiver<Work>) {
    for work in rx {
        match work {
            Work::Connected => on_connected(client),
            Work::Command { topic, payload } => route(router, &topic, &payload),
        }
    }
    debug!("MQTT command worker finished");
}

/// Blocking on purpose: availability and subscriptions must not be dropped
fn on_connected(client: &Client) {
    if let Err(e) = client.publish(topics::AVAILABILITY, QoS::AtLeastOnce, true, topics::ONLINE) {
        error!("Failed to publish availability: {}", e);
    }
    for topic in topics::SUBSCRIPTIONS {
        if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce) {
            error!("Failed to subscribe to {}: {}", topic, e);
        }
    }
}

fn route(router: &CommandRouter, topic: &str, payload: &str) {
    match router.handle(topic, payload) {
        Ok(()) => {}
        Err(e @ CommandError::InvalidTopic(_)) | Err(e @ CommandError::InvalidPayload { .. }) => {
            warn!("Ignoring command: {}", e)
        }
        Err(e) => error!("Command {} {} failed: {}", topic, payload, e),
    }
}
