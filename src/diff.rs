use serde_json::Value;

use crate::types::{Event, Snapshot};

/// Collect `(path, old, new)` for every leaf that differs between two JSON
/// documents. Paths are dot-joined; array elements use their index.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    let join = |key: &str| {
        if path_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{path_prefix}.{key}")
        }
    };

    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = join(key);
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => diff_json(
                        &Value::Object(serde_json::Map::new()),
                        curr_val,
                        &path,
                        changes,
                    ),
                    None => changes.push((path, Value::Null, curr_val.clone())),
                }
            }
            for (key, prev_val) in prev_map {
                if !curr_map.contains_key(key) {
                    changes.push((join(key), prev_val.clone(), Value::Null));
                }
            }
        }
        (Value::Array(prev_arr), Value::Array(curr_arr)) if prev_arr.len() == curr_arr.len() => {
            for (idx, (prev_val, curr_val)) in prev_arr.iter().zip(curr_arr).enumerate() {
                diff_json(prev_val, curr_val, &join(&idx.to_string()), changes);
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Events describing how `current` differs from `previous`.
pub(crate) fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<Event> {
    let mut events = Vec::new();

    for device in current.iter() {
        let serial = &device.serial_number;
        let Some(prev) = previous.get(serial) else {
            events.push(Event::DeviceAdded {
                serial: serial.clone(),
                name: device.display_name.clone(),
            });
            continue;
        };

        if prev.online != device.online {
            events.push(Event::OnlineChanged {
                serial: serial.clone(),
                online: device.online,
            });
        }
        if prev.heating != device.heating {
            events.push(Event::HeatingChanged {
                serial: serial.clone(),
                heating: device.heating,
            });
        }
        if prev.current_temperature != device.current_temperature {
            events.push(Event::TemperatureChanged {
                serial: serial.clone(),
                temp: device.current_temperature,
            });
        }
        if prev.target_temperature != device.target_temperature {
            events.push(Event::SetpointChanged {
                serial: serial.clone(),
                temp: device.target_temperature,
            });
        }
        if prev.humidity != device.humidity {
            events.push(Event::HumidityChanged {
                serial: serial.clone(),
                humidity: device.humidity,
            });
        }
    }

    for serial in previous.devices().keys() {
        if current.get(serial).is_none() {
            events.push(Event::DeviceRemoved {
                serial: serial.clone(),
            });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Device, Temperature};
    use chrono::Utc;
    use serde_json::json;

    fn device(serial: &str, setpoint: i32) -> Device {
        let listing = json!({
            "type": "UWG4",
            "sn": serial,
            "current_version": "1.0",
            "display_name": "Hall",
            "connected": true,
            "device_id": format!("guid-{serial}")
        });
        let mut d = Device::from_listing_record(&listing).unwrap();
        d.target_temperature = Temperature::from_centidegrees(setpoint);
        d
    }

    #[test]
    fn diff_json_nested_and_arrays() {
        let prev = json!({"a": {"b": 1}, "list": [{"value": "20"}], "gone": true});
        let curr = json!({"a": {"b": 2}, "list": [{"value": "21"}], "new": "x"});
        let mut changes = Vec::new();
        diff_json(&prev, &curr, "", &mut changes);

        let paths: Vec<&str> = changes.iter().map(|(p, _, _)| p.as_str()).collect();
        assert!(paths.contains(&"a.b"));
        assert!(paths.contains(&"list.0.value"));
        assert!(paths.contains(&"new"));
        assert!(paths.contains(&"gone"));
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn diff_json_identical_is_empty() {
        let v = json!({"a": [1, 2, {"b": null}]});
        let mut changes = Vec::new();
        diff_json(&v, &v, "", &mut changes);
        assert!(changes.is_empty());
    }

    #[test]
    fn first_snapshot_adds_every_device() {
        let next = Snapshot::new([device("A", 2000), device("B", 2100)], Utc::now());
        let events = diff_snapshots(&Snapshot::default(), &next);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, Event::DeviceAdded { .. })));
    }

    #[test]
    fn setpoint_change_and_removal() {
        let prev = Snapshot::new([device("A", 2000), device("B", 2100)], Utc::now());
        let next = Snapshot::new([device("A", 2150)], Utc::now());
        let events = diff_snapshots(&prev, &next);
        assert_eq!(
            events,
            vec![
                Event::SetpointChanged {
                    serial: "A".into(),
                    temp: Temperature::from_centidegrees(2150)
                },
                Event::DeviceRemoved { serial: "B".into() },
            ]
        );
    }

    #[test]
    fn unchanged_snapshot_emits_nothing() {
        let prev = Snapshot::new([device("A", 2000)], Utc::now());
        let next = Snapshot::new([device("A", 2000)], Utc::now());
        assert!(diff_snapshots(&prev, &next).is_empty());
    }
}
