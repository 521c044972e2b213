use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;

/// How response bodies are written to the traffic log.
pub enum MessageLogMode {
    /// Every response body in full.
    Full,
    /// The first body per path in full, then only the changed leaves.
    Diffed,
}

/// Append-only NDJSON record of upstream requests and responses.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    /// `body` must already have secrets redacted.
    pub fn log_request(&mut self, method: &str, path: &str, body: Option<&Value>) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    /// `body` is `None` when the response was rejected or unreadable.
    pub fn log_response(&mut self, path: &str, status: u16, body: Option<&Value>) {
        let Some(body) = body else {
            let entry = json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
            });
            self.write_line(&entry);
            return;
        };

        let body = crate::protocol::redact(body);
        let entry = match self.mode {
            MessageLogMode::Full => json!({
                "ts": Utc::now().to_rfc3339(),
                "dir": "resp",
                "path": path,
                "status": status,
                "body": body,
            }),
            MessageLogMode::Diffed => match self.previous.get(path) {
                None => json!({
                    "ts": Utc::now().to_rfc3339(),
                    "dir": "resp",
                    "path": path,
                    "status": status,
                    "full": true,
                    "body": body,
                }),
                Some(prev) => {
                    let mut changes = Vec::new();
                    diff_json(prev, &body, "", &mut changes);
                    let change_entries: Vec<Value> = changes
                        .iter()
                        .map(|(p, old, new)| json!({ "path": p, "old": old, "new": new }))
                        .collect();
                    json!({
                        "ts": Utc::now().to_rfc3339(),
                        "dir": "resp",
                        "path": path,
                        "status": status,
                        "changes": change_entries,
                    })
                }
            },
        };
        self.write_line(&entry);
        if matches!(self.mode, MessageLogMode::Diffed) {
            self.previous.insert(path.to_string(), body);
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write traffic log entry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn read_lines(path: &str) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn log_request_writes_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_request("GET", "/v2/consumer/devices", None);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "GET");
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn diffed_mode_tracks_each_path_separately() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Diffed, path).unwrap();

        let devices = json!({"devices": [{"sn": "A", "connected": true}]});
        let history = json!({"room_setpoint": {"data": [{"value": "20"}]}});
        logger.log_response("/v2/consumer/devices", 200, Some(&devices));
        logger.log_response("/v2/consumer/history/g/latest", 200, Some(&history));

        let changed = json!({"room_setpoint": {"data": [{"value": "21"}]}});
        logger.log_response("/v2/consumer/history/g/latest", 200, Some(&changed));

        let lines = read_lines(path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["full"], true);
        assert_eq!(lines[1]["full"], true);
        let changes = lines[2]["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["new"], "21");
    }

    #[test]
    fn rejected_response_logs_status_only() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_response("/oauth/token", 401, None);

        let lines = read_lines(path);
        assert_eq!(lines[0]["dir"], "resp");
        assert_eq!(lines[0]["status"], 401);
        assert!(lines[0].get("body").is_none());
    }

    #[test]
    fn access_token_never_reaches_the_log() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let mut logger = MessageLogger::new(MessageLogMode::Full, path).unwrap();
        logger.log_response("/oauth/token", 200, Some(&json!({"access_token": "abc"})));

        let contents = std::fs::read_to_string(path).unwrap();
        assert!(!contents.contains("abc"));
    }
}
