//! Process-wide gateway state
//!
//! HVAC records and the zone bypass snapshot are read-modify-write
//! structures touched by both the listener and MQTT command handlers. They
//! live behind one lock, separate from the serial access lock, and every
//! read-then-write sequence happens inside a single method call.
//!
//! Command-driven updates run their bus write while holding the state lock
//! and only store the new value once the write succeeded. Lock order is
//! state, then serial; the listener never holds the serial lock while it
//! touches the state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::entity::{toggle_bypass, EntityRef, EntityType, HvacRecord, HvacReport, HvacSetting};
use crate::protocol::ProtocolError;

/// Runtime counters published with the heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub uptime_seconds: u64,
    pub messages_processed: u64,
    pub errors_count: u64,
    pub last_command: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    hvac: HashMap<u32, HvacRecord>,
    bypass: String,
    names: HashMap<EntityRef, String>,
    messages_processed: u64,
    errors_count: u64,
    last_command: Option<String>,
}

/// Shared state of one gateway process
#[derive(Debug)]
pub struct GatewayState {
    started: Instant,
    inner: Mutex<Inner>,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayState {
    /// Empty state; uptime counts from now
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a full `@I H` report, returning the merged record
    pub fn merge_hvac(&self, id: u32, report: &HvacReport) -> HvacRecord {
        let mut inner = self.inner();
        let record = inner.hvac.entry(id).or_default();
        record.apply_report(report);
        *record
    }

    /// Record a measured temperature, returning the merged record
    pub fn set_current_temperature(&self, id: u32, value: f32) -> HvacRecord {
        let mut inner = self.inner();
        let record = inner.hvac.entry(id).or_default();
        record.current_temperature = Some(value);
        *record
    }

    /// Apply one requested field change through `send`
    ///
    /// `send` receives the merged record; the record is stored only when it
    /// returns `Ok`, so a failed write leaves the last known values intact.
    pub fn apply_hvac_setting<E>(
        &self,
        id: u32,
        setting: HvacSetting,
        send: impl FnOnce(&HvacRecord) -> Result<(), E>,
    ) -> Result<HvacRecord, E> {
        let mut inner = self.inner();
        let mut record = inner.hvac.get(&id).copied().unwrap_or_default();
        record.apply_setting(setting);
        send(&record)?;
        inner.hvac.insert(id, record);
        Ok(record)
    }

    /// Last known record of an HVAC unit
    pub fn hvac(&self, id: u32) -> Option<HvacRecord> {
        self.inner().hvac.get(&id).copied()
    }

    /// Replace the bypass snapshot
    pub fn set_bypass(&self, states: &str) {
        self.inner().bypass = states.to_string();
    }

    /// Current bypass snapshot (empty until the first `@I B`)
    pub fn bypass(&self) -> String {
        self.inner().bypass.clone()
    }

    /// Toggle one zone and hand the full new string to `send`
    ///
    /// The snapshot only changes when `send` succeeds, so a toggle the bus
    /// never received cannot leak into the next one.
    pub fn toggle_bypass<E: From<ProtocolError>>(
        &self,
        zone_id: u32,
        bypassed: bool,
        zone_count: usize,
        send: impl FnOnce(&str) -> Result<(), E>,
    ) -> Result<String, E> {
        let mut inner = self.inner();
        let next = toggle_bypass(&inner.bypass, zone_id, bypassed, zone_count)?;
        send(&next)?;
        debug!("Bypass {} -> {}", inner.bypass, next);
        inner.bypass = next.clone();
        Ok(next)
    }

    /// Remember the configured name of an entity
    pub fn set_entity_name(&self, entity: EntityType, id: u32, name: &str) {
        self.inner()
            .names
            .insert(EntityRef::new(entity, id), name.to_string());
    }

    /// Configured name of an entity, if it was fetched
    pub fn entity_name(&self, entity: EntityType, id: u32) -> Option<String> {
        self.inner().names.get(&EntityRef::new(entity, id)).cloned()
    }

    /// Name for logs and discovery: the fetched name or "{Type} {id}"
    pub fn entity_label(&self, entity: EntityType, id: u32) -> String {
        self.entity_name(entity, id)
            .unwrap_or_else(|| format!("{} {}", entity.label(), id))
    }

    pub fn increment_messages(&self) {
        self.inner().messages_processed += 1;
    }

    pub fn increment_errors(&self) {
        self.inner().errors_count += 1;
    }

    /// Remember the last command received from MQTT
    pub fn set_last_command(&self, command: impl Into<String>) {
        self.inner().last_command = Some(command.into());
    }

    /// Snapshot of the counters
    pub fn diagnostics(&self) -> Diagnostics {
        let inner = self.inner();
        Diagnostics {
            uptime_seconds: self.started.elapsed().as_secs(),
            messages_processed: inner.messages_processed,
            errors_count: inner.errors_count,
            last_command: inner.last_command.clone(),
        }
    }
}
