use serde_json::{Map, Value, json};

use crate::auth::Credentials;
use crate::types::{RegulationMode, Temperature};

pub const DEFAULT_AUTH_URL: &str = "https://joule-technologies-dev.eu.auth0.com";
pub const DEFAULT_API_URL: &str = "https://user-api.joule-cloud.com";

pub const DEFAULT_AUDIENCE: &str = "https://user-api.joule-cloud.com/";
pub const DEFAULT_CLIENT_ID: &str = "lS6O7Nf6WV7mxxXe0hBSbCxqyFdhgvqd";
pub const DEFAULT_SCOPE: &str = "openid email profile";

pub const TOKEN_PATH: &str = "/oauth/token";
pub const DEVICES_PATH: &str = "/v2/consumer/devices";

pub const HISTORY_FILTER: &str = "ambient_temperature,ambient_humidity,ambient_eco2,\
    ambient_offset,boiler_control_mode,room_setpoint,weekschedule_state,\
    ventilation_level,flame_state";

const REDACTED: &str = "***";

/// Paths served by the auth host. Everything else goes to the resource host.
pub fn is_auth_path(path: &str) -> bool {
    path.contains(TOKEN_PATH)
}

pub fn history_path(device_guid: &str) -> String {
    format!("/v2/consumer/history/{device_guid}/latest")
}

pub fn history_query() -> [(&'static str, &'static str); 1] {
    [("filter", HISTORY_FILTER)]
}

pub fn config_path(device_guid: &str) -> String {
    format!("{DEVICES_PATH}/{device_guid}/config")
}

pub fn login_form(creds: &Credentials) -> Value {
    let mut form = Map::new();
    form.insert("username".into(), json!(creds.username));
    form.insert("password".into(), json!(creds.password));
    form.insert("grant_type".into(), json!("password"));
    form.insert("scope".into(), json!(creds.scope));
    form.insert("audience".into(), json!(creds.audience));
    form.insert("client_id".into(), json!(creds.client_id));
    if let Some(secret) = &creds.client_secret {
        form.insert("client_secret".into(), json!(secret));
    }
    Value::Object(form)
}

/// The upstream takes the setpoint in degrees here, while history reports it
/// as a value this crate stores in centidegrees.
pub fn set_temperature_data(
    temp: Temperature,
    mode: Option<RegulationMode>,
    duration: Option<u32>,
) -> Value {
    let mut data = json!({
        "room_setpoint": {
            "temperature": temp.celsius()
        }
    });
    if let Some(mode) = mode {
        data["regulation_mode"] = json!(mode.0);
    }
    if let Some(duration) = duration {
        data["duration"] = json!(duration);
    }
    data
}

pub fn set_mode_data(mode: RegulationMode) -> Value {
    json!({ "regulation_mode": mode.0 })
}

pub fn parse_access_token(body: &Value) -> Option<String> {
    body.get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Copy of a request body safe to write to the traffic log.
pub fn redact(body: &Value) -> Value {
    let mut copy = body.clone();
    if let Some(map) = copy.as_object_mut() {
        for key in ["password", "client_secret", "access_token"] {
            if let Some(v) = map.get_mut(key) {
                *v = json!(REDACTED);
            }
        }
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("user@example.com", "hunter2")
    }

    #[test]
    fn auth_path_routing() {
        assert!(is_auth_path("/oauth/token"));
        assert!(!is_auth_path(DEVICES_PATH));
        assert!(!is_auth_path(&history_path("abc")));
    }

    #[test]
    fn login_form_structure() {
        let form = login_form(&creds());
        assert_eq!(form["grant_type"], "password");
        assert_eq!(form["scope"], "openid email profile");
        assert_eq!(form["audience"], DEFAULT_AUDIENCE);
        assert_eq!(form["client_id"], DEFAULT_CLIENT_ID);
        assert!(form.get("client_secret").is_none());

        let form = login_form(&creds().with_client("other-id", Some("s3cret".into())));
        assert_eq!(form["client_id"], "other-id");
        assert_eq!(form["client_secret"], "s3cret");
    }

    #[test]
    fn set_temperature_sends_degrees() {
        let data = set_temperature_data(Temperature::from_centidegrees(2150), None, None);
        assert_eq!(data["room_setpoint"]["temperature"], 21.5);
        assert!(data.get("regulation_mode").is_none());
        assert!(data.get("duration").is_none());

        let data = set_temperature_data(
            Temperature::from_centidegrees(2000),
            Some(RegulationMode::COMFORT),
            Some(3600),
        );
        assert_eq!(data["regulation_mode"], 1);
        assert_eq!(data["duration"], 3600);
    }

    #[test]
    fn history_endpoint() {
        assert_eq!(history_path("g-1"), "/v2/consumer/history/g-1/latest");
        let [(key, filter)] = history_query();
        assert_eq!(key, "filter");
        assert!(filter.starts_with("ambient_temperature,"));
        assert!(filter.ends_with(",flame_state"));
        assert!(!filter.contains(' '));
    }

    #[test]
    fn redact_hides_secrets() {
        let form = login_form(&creds());
        let redacted = redact(&form);
        assert_eq!(redacted["password"], "***");
        assert_eq!(redacted["username"], "user@example.com");
    }

    #[test]
    fn access_token_must_be_non_empty() {
        assert_eq!(parse_access_token(&json!({"access_token": "abc"})), Some("abc".into()));
        assert_eq!(parse_access_token(&json!({"access_token": ""})), None);
        assert_eq!(parse_access_token(&json!({"token": "abc"})), None);
    }
}
