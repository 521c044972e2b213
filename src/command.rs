use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::coordinator::Coordinator;
use crate::protocol;
use crate::transport::{Method, Transport};
use crate::types::{RegulationMode, Temperature};
use crate::Result;

/// The upstream read path lags behind writes; one second was too short in
/// practice. This delay makes a stale read unlikely, not impossible.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(2);

/// User options applied to setpoint changes made through the client facade.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandOptions {
    #[serde(default)]
    pub use_comfort_mode: bool,
    /// Passed through untouched as the command's `duration`.
    #[serde(default)]
    pub comfort_mode_duration: Option<u32>,
}

impl CommandOptions {
    pub(crate) fn mode(&self) -> Option<RegulationMode> {
        self.use_comfort_mode.then_some(RegulationMode::COMFORT)
    }

    pub(crate) fn duration(&self) -> Option<u32> {
        self.comfort_mode_duration.filter(|_| self.use_comfort_mode)
    }
}

/// Sends device mutations and reconciles the cache afterwards.
pub struct CommandDispatcher {
    transport: Arc<Transport>,
    coordinator: Coordinator,
    refresh_delay: Duration,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<Transport>, coordinator: Coordinator, refresh_delay: Duration) -> Self {
        Self {
            transport,
            coordinator,
            refresh_delay,
        }
    }

    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }

    /// Change a device's setpoint, optionally with a regulation mode and duration.
    pub async fn set_temperature(
        &self,
        serial: &str,
        temp: Temperature,
        mode: Option<RegulationMode>,
        duration: Option<u32>,
    ) -> Result<()> {
        let data = protocol::set_temperature_data(temp, mode, duration);
        self.patch_config("set_temperature", serial, &data).await
    }

    pub async fn set_mode(&self, serial: &str, mode: RegulationMode) -> Result<()> {
        let data = protocol::set_mode_data(mode);
        self.patch_config("set_mode", serial, &data).await
    }

    async fn patch_config(&self, action: &str, serial: &str, data: &Value) -> Result<()> {
        let guid = self.coordinator.get_device(serial)?.device_guid;
        debug!(action, serial, "sending command");

        self.transport
            .request(&protocol::config_path(&guid), Method::PATCH, &[], Some(data))
            .await
            .inspect_err(|e| warn!(action, serial, error = %e, "command failed"))?;

        self.delayed_refresh().await;
        Ok(())
    }

    async fn delayed_refresh(&self) {
        tokio::time::sleep(self.refresh_delay).await;
        if let Err(e) = self.coordinator.refresh_now().await {
            warn!(error = %e, "refresh after command failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comfort_options_only_apply_when_enabled() {
        let opts = CommandOptions {
            use_comfort_mode: false,
            comfort_mode_duration: Some(120),
        };
        assert_eq!(opts.mode(), None);
        assert_eq!(opts.duration(), None);

        let opts = CommandOptions {
            use_comfort_mode: true,
            comfort_mode_duration: Some(120),
        };
        assert_eq!(opts.mode(), Some(RegulationMode::COMFORT));
        assert_eq!(opts.duration(), Some(120));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: CommandOptions = serde_json::from_str("{}").unwrap();
        assert!(!opts.use_comfort_mode);
        assert!(opts.comfort_mode_duration.is_none());
    }
}
