//! Sensor and binary-sensor descriptors for presenting cached devices.
//!
//! Each descriptor pairs a stable key with a typed accessor over [`Device`].
//! Which sensors a device exposes is decided once, when the presentation layer
//! builds its entities, by calling [`sensors_for`] / [`binary_sensors_for`].

use std::fmt;

use crate::types::{Device, Temperature};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    Temperature(Temperature),
    Percent(u32),
}

impl SensorValue {
    /// Value in display units (degrees for temperatures).
    pub fn as_f64(&self) -> f64 {
        match self {
            SensorValue::Temperature(t) => t.celsius(),
            SensorValue::Percent(p) => f64::from(*p),
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Temperature(t) => write!(f, "{t}"),
            SensorValue::Percent(p) => write!(f, "{p}%"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorUnit {
    Celsius,
    Percent,
}

pub struct SensorDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: SensorUnit,
    pub read: fn(&Device) -> Option<SensorValue>,
}

pub struct BinarySensorDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub read: fn(&Device) -> Option<bool>,
}

pub const SENSORS: &[SensorDescriptor] = &[
    SensorDescriptor {
        key: "temperature",
        name: "Temperature Room",
        unit: SensorUnit::Celsius,
        read: |d| Some(SensorValue::Temperature(d.current_temperature)),
    },
    SensorDescriptor {
        key: "humidity",
        name: "Humidity Room",
        unit: SensorUnit::Percent,
        read: |d| d.humidity.map(SensorValue::Percent),
    },
];

pub const BINARY_SENSORS: &[BinarySensorDescriptor] = &[
    BinarySensorDescriptor {
        key: "online",
        name: "Online",
        read: |d| Some(d.online),
    },
    BinarySensorDescriptor {
        key: "heating",
        name: "Heating",
        read: |d| d.heating,
    },
];

pub fn sensors_for(device: &Device) -> Vec<&'static SensorDescriptor> {
    SENSORS.iter().filter(|s| (s.read)(device).is_some()).collect()
}

pub fn binary_sensors_for(device: &Device) -> Vec<&'static BinarySensorDescriptor> {
    BINARY_SENSORS
        .iter()
        .filter(|s| (s.read)(device).is_some())
        .collect()
}

/// Stable entity id for a sensor on a device, e.g. `SN-1_temperature`.
pub fn unique_id(device: &Device, key: &str) -> String {
    format!("{}_{key}", device.serial_number)
}
