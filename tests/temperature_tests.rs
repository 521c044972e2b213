use joule_connector::{Device, HvacAction, RegulationMode, Temperature};

#[test]
fn from_centidegrees() {
    let t = Temperature::from_centidegrees(2150);
    assert_eq!(t.centidegrees(), 2150);
    assert!((t.celsius() - 21.5).abs() < 1e-9);
}

#[test]
fn from_celsius_rounds_to_centidegrees() {
    assert_eq!(Temperature::from_celsius(21.0).centidegrees(), 2100);
    assert_eq!(Temperature::from_celsius(20.1).centidegrees(), 2010);
    assert_eq!(Temperature::from_celsius(-3.456).centidegrees(), -346);
}

#[test]
fn display() {
    let t = Temperature::from_centidegrees(2250);
    assert_eq!(format!("{t}"), "22.5\u{00b0}C");
    assert_eq!(format!("{:.1}", Temperature::from_centidegrees(2100).celsius()), "21.0");
}

#[test]
fn ordering_follows_centidegrees() {
    assert!(Temperature::from_centidegrees(1999) < Temperature::from_centidegrees(2000));
}

#[test]
fn regulation_mode_constants() {
    assert_eq!(RegulationMode::DEFAULT, RegulationMode(0));
    assert_ne!(RegulationMode::DEFAULT, RegulationMode::COMFORT);
    assert_eq!(RegulationMode::COMFORT.to_string(), "1");
}

#[test]
fn full_device_from_both_payloads() {
    let listing = serde_json::json!({
        "type": "AWG4",
        "sn": "SN-7",
        "current_version": "2.0.1",
        "display_name": "Office",
        "connected": false,
        "device_id": "guid-7"
    });
    let history = serde_json::json!({
        "room_setpoint": { "data": [{ "value": "21" }, { "value": "18" }] },
        "ambient_temperature": { "data": [{ "value": "20.5" }] }
    });

    let device = Device::from_listing_record(&listing)
        .unwrap()
        .merge_history(&history)
        .unwrap();

    assert_eq!(device.target_temperature.centidegrees(), 2100);
    assert_eq!(device.current_temperature.centidegrees(), 2050);
    assert_eq!(device.display_name, "Office SN-7");
    assert_eq!(device.humidity, None);
    assert_eq!(device.heating, Some(false));
    assert_eq!(device.hvac_action(), HvacAction::Off);
}
