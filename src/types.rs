use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// Temperature stored as integer hundredths of a degree Celsius.
/// Conversion to degrees is only for display and the command wire body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Temperature(i32);

impl Temperature {
    pub fn from_centidegrees(centi: i32) -> Self {
        Self(centi)
    }

    /// Rounds to the nearest centidegree.
    pub fn from_celsius(c: f64) -> Self {
        Self((c * 100.0).round() as i32)
    }

    pub fn centidegrees(&self) -> i32 {
        self.0
    }

    pub fn celsius(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.celsius())
    }
}

/// Upstream regulation mode. The API only exposes it as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(transparent)]
pub struct RegulationMode(pub u8);

impl RegulationMode {
    pub const DEFAULT: RegulationMode = RegulationMode(0);
    pub const COMFORT: RegulationMode = RegulationMode(1);
}

impl fmt::Display for RegulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HvacAction {
    #[default]
    Off,
    Idle,
    Heating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub serial_number: String,
    pub device_guid: String,
    pub model: String,
    pub software_version: String,
    pub display_name: String,
    pub online: bool,
    pub heating: Option<bool>,
    pub current_temperature: Temperature,
    pub target_temperature: Temperature,
    pub humidity: Option<u32>,
    pub regulation_mode: RegulationMode,
    pub supported_regulation_modes: BTreeSet<RegulationMode>,
}

#[derive(Deserialize)]
struct ListingRecord {
    #[serde(rename = "type")]
    model: String,
    #[serde(rename = "sn")]
    serial_number: String,
    current_version: String,
    display_name: String,
    connected: bool,
    device_id: String,
}

impl Device {
    /// Build the partial device described by one `/v2/consumer/devices` entry.
    /// Temperatures stay zero until [`Device::merge_history`] fills them.
    pub fn from_listing_record(data: &Value) -> Result<Device> {
        let record = ListingRecord::deserialize(data)
            .map_err(|e| Error::MalformedResponse(format!("device listing entry: {e}")))?;
        Ok(Device {
            serial_number: record.serial_number,
            device_guid: record.device_id,
            model: record.model,
            software_version: record.current_version,
            display_name: record.display_name,
            online: record.connected,
            heating: Some(false),
            current_temperature: Temperature::default(),
            target_temperature: Temperature::default(),
            humidity: None,
            regulation_mode: RegulationMode::DEFAULT,
            supported_regulation_modes: BTreeSet::new(),
        })
    }

    /// Complete a listed device with its latest history sample.
    pub fn merge_history(mut self, data: &Value) -> Result<Device> {
        let setpoint = latest_sample(data, "room_setpoint")
            .ok_or_else(|| self.missing_field("room_setpoint"))?;
        let ambient = latest_sample(data, "ambient_temperature")
            .ok_or_else(|| self.missing_field("ambient_temperature"))?;

        self.target_temperature = Temperature::from_celsius(
            sample_as_f64(setpoint).ok_or_else(|| self.bad_value("room_setpoint", setpoint))?,
        );
        self.current_temperature = Temperature::from_celsius(
            sample_as_f64(ambient)
                .ok_or_else(|| self.bad_value("ambient_temperature", ambient))?,
        );

        if let Some(humidity) = latest_sample(data, "ambient_humidity").and_then(sample_as_f64) {
            self.humidity = Some(humidity.round().max(0.0) as u32);
        }
        if let Some(flame) = latest_sample(data, "flame_state").and_then(sample_as_bool) {
            self.heating = Some(flame);
        }

        self.display_name = format!("{} {}", self.display_name, self.serial_number);
        Ok(self)
    }

    pub fn hvac_action(&self) -> HvacAction {
        if self.heating == Some(true) {
            HvacAction::Heating
        } else if self.online {
            HvacAction::Idle
        } else {
            HvacAction::Off
        }
    }

    fn missing_field(&self, field: &str) -> Error {
        Error::MalformedResponse(format!(
            "history for {} has no {field} sample",
            self.serial_number
        ))
    }

    fn bad_value(&self, field: &str, value: &Value) -> Error {
        Error::MalformedResponse(format!(
            "history for {} has non-numeric {field}: {value}",
            self.serial_number
        ))
    }
}

fn latest_sample<'a>(data: &'a Value, field: &str) -> Option<&'a Value> {
    data.get(field)?.get("data")?.get(0)?.get("value")
}

/// Only finite readings that still fit in centidegrees count as numbers.
fn sample_as_f64(value: &Value) -> Option<f64> {
    let v: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (v.is_finite() && (v * 100.0).abs() <= f64::from(i32::MAX)).then_some(v)
}

fn sample_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        other => sample_as_f64(other).map(|v| v != 0.0),
    }
}

/// Point-in-time view of every fully populated device, keyed by serial number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    devices: BTreeMap<String, Device>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub(crate) fn new(devices: impl IntoIterator<Item = Device>, at: DateTime<Utc>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|d| (d.serial_number.clone(), d))
                .collect(),
            refreshed_at: Some(at),
        }
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.devices.get(serial)
    }

    pub fn devices(&self) -> &BTreeMap<String, Device> {
        &self.devices
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// `None` until the first successful cycle.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

/// Events emitted when a newly published snapshot differs from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DeviceAdded { serial: String, name: String },
    DeviceRemoved { serial: String },
    OnlineChanged { serial: String, online: bool },
    HeatingChanged { serial: String, heating: Option<bool> },
    TemperatureChanged { serial: String, temp: Temperature },
    SetpointChanged { serial: String, temp: Temperature },
    HumidityChanged { serial: String, humidity: Option<u32> },
}
