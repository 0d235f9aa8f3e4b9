//! HVAC state
//!
//! The bus reports HVAC fields piecemeal (`@I H` for setpoints/fan/mode,
//! `@I T` for the measured temperature), but a set command must carry all
//! four writable fields. [`HvacRecord`] keeps the last known value of each.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Setpoints accepted from the MQTT side, in degrees Celsius
pub const SETPOINT_RANGE: RangeInclusive<f32> = 0.0..=50.0;

/// HVAC operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Auto,
    Heat,
    Cool,
    Off,
    Economy,
    Normal,
}

impl HvacMode {
    /// Parse the wire code
    pub fn from_code(token: &str) -> Option<Self> {
        match token {
            "A" => Some(HvacMode::Auto),
            "H" => Some(HvacMode::Heat),
            "C" => Some(HvacMode::Cool),
            "O" => Some(HvacMode::Off),
            "E" => Some(HvacMode::Economy),
            "N" => Some(HvacMode::Normal),
            _ => None,
        }
    }

    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            HvacMode::Auto => "A",
            HvacMode::Heat => "H",
            HvacMode::Cool => "C",
            HvacMode::Off => "O",
            HvacMode::Economy => "E",
            HvacMode::Normal => "N",
        }
    }

    /// Parse a mode name, case-insensitive
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(HvacMode::Auto),
            "heat" => Some(HvacMode::Heat),
            "cool" => Some(HvacMode::Cool),
            "off" => Some(HvacMode::Off),
            "economy" => Some(HvacMode::Economy),
            "normal" => Some(HvacMode::Normal),
            _ => None,
        }
    }

    /// Lowercase mode name
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Auto => "auto",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::Off => "off",
            HvacMode::Economy => "economy",
            HvacMode::Normal => "normal",
        }
    }
}

/// HVAC fan state ('R' running, 'S' stopped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanState {
    On,
    Off,
}

impl FanState {
    /// Parse the wire code
    pub fn from_code(token: &str) -> Option<Self> {
        match token {
            "R" => Some(FanState::On),
            "S" => Some(FanState::Off),
            _ => None,
        }
    }

    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            FanState::On => "R",
            FanState::Off => "S",
        }
    }

    /// Parse a fan state name, case-insensitive
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "on" => Some(FanState::On),
            "off" => Some(FanState::Off),
            _ => None,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            FanState::On => "on",
            FanState::Off => "off",
        }
    }
}

/// Full HVAC report carried by one `@I H` message
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HvacReport {
    pub heating_setpoint: f32,
    pub cooling_setpoint: f32,
    pub fan: FanState,
    pub mode: HvacMode,
}

/// A single writable HVAC field, as requested from the MQTT side
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HvacSetting {
    HeatingSetpoint(f32),
    CoolingSetpoint(f32),
    Fan(FanState),
    Mode(HvacMode),
}

impl HvacSetting {
    /// Parse a field name and its payload
    ///
    /// Field names match the `cardio2e/hvac/{id}/set/{field}` topic suffixes.
    /// Setpoints must be finite and within [`SETPOINT_RANGE`].
    pub fn parse(field: &str, value: &str) -> Option<Self> {
        match field {
            "heating_setpoint" => parse_setpoint(value).map(HvacSetting::HeatingSetpoint),
            "cooling_setpoint" => parse_setpoint(value).map(HvacSetting::CoolingSetpoint),
            "fan" => FanState::from_name(value).map(HvacSetting::Fan),
            "mode" => HvacMode::from_name(value).map(HvacSetting::Mode),
            _ => None,
        }
    }

    /// Field name
    pub fn field(&self) -> &'static str {
        match self {
            HvacSetting::HeatingSetpoint(_) => "heating_setpoint",
            HvacSetting::CoolingSetpoint(_) => "cooling_setpoint",
            HvacSetting::Fan(_) => "fan",
            HvacSetting::Mode(_) => "mode",
        }
    }
}

fn parse_setpoint(value: &str) -> Option<f32> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && SETPOINT_RANGE.contains(v))
}

/// Complete set of writable fields required by an `@S H` command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HvacSetpoint {
    pub heating_setpoint: f32,
    pub cooling_setpoint: f32,
    pub fan: FanState,
    pub mode: HvacMode,
}

impl From<HvacReport> for HvacSetpoint {
    fn from(report: HvacReport) -> Self {
        Self {
            heating_setpoint: report.heating_setpoint,
            cooling_setpoint: report.cooling_setpoint,
            fan: report.fan,
            mode: report.mode,
        }
    }
}

/// Last known state of one HVAC unit
///
/// Every field is optional because the record is created on first sighting,
/// which may be a temperature reading rather than a full report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HvacRecord {
    pub heating_setpoint: Option<f32>,
    pub cooling_setpoint: Option<f32>,
    pub fan: Option<FanState>,
    pub mode: Option<HvacMode>,
    pub current_temperature: Option<f32>,
}

impl HvacRecord {
    /// Merge a full `@I H` report; the measured temperature is kept
    pub fn apply_report(&mut self, report: &HvacReport) {
        self.heating_setpoint = Some(report.heating_setpoint);
        self.cooling_setpoint = Some(report.cooling_setpoint);
        self.fan = Some(report.fan);
        self.mode = Some(report.mode);
    }

    /// Merge one field
    pub fn apply_setting(&mut self, setting: HvacSetting) {
        match setting {
            HvacSetting::HeatingSetpoint(v) => self.heating_setpoint = Some(v),
            HvacSetting::CoolingSetpoint(v) => self.cooling_setpoint = Some(v),
            HvacSetting::Fan(f) => self.fan = Some(f),
            HvacSetting::Mode(m) => self.mode = Some(m),
        }
    }

    /// Build the complete setpoint needed for an `@S H` command
    pub fn setpoint(&self) -> Result<HvacSetpoint, ProtocolError> {
        Ok(HvacSetpoint {
            heating_setpoint: self
                .heating_setpoint
                .ok_or(ProtocolError::MissingHvacField("heating_setpoint"))?,
            cooling_setpoint: self
                .cooling_setpoint
                .ok_or(ProtocolError::MissingHvacField("cooling_setpoint"))?,
            fan: self.fan.ok_or(ProtocolError::MissingHvacField("fan"))?,
            mode: self.mode.ok_or(ProtocolError::MissingHvacField("mode"))?,
        })
    }
}

/// Format a setpoint the way the controller prints them
///
/// Integral values lose the fractional part ("21"), others keep one decimal
/// ("21.5").
pub fn format_setpoint(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}
