use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthSession, Credentials};
use crate::command::{CommandDispatcher, CommandOptions, DEFAULT_REFRESH_DELAY};
use crate::coordinator::{
    Coordinator, EventCallback, RefreshSettings, RefreshStatus, SnapshotCallback,
    DEFAULT_CYCLE_TIMEOUT, DEFAULT_REFRESH_INTERVAL,
};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{DEFAULT_API_URL, DEFAULT_AUTH_URL};
use crate::transport::{Transport, DEFAULT_REQUEST_TIMEOUT};
use crate::types::*;
use crate::{Error, Result};

pub struct JouleClientBuilder {
    credentials: Credentials,
    auth_url: String,
    api_url: String,
    request_timeout: Duration,
    refresh_interval: Duration,
    cycle_timeout: Option<Duration>,
    refresh_delay: Duration,
    command_options: CommandOptions,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl JouleClientBuilder {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            cycle_timeout: Some(DEFAULT_CYCLE_TIMEOUT),
            refresh_delay: DEFAULT_REFRESH_DELAY,
            command_options: CommandOptions::default(),
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    /// Base URL of the token endpoint host, e.g. `https://example.auth0.com`.
    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Base URL of the device API host.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn cycle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Wait between a successful command and the refresh that follows it.
    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn command_options(mut self, options: CommandOptions) -> Self {
        self.command_options = options;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&Snapshot) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<JouleClient> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(Arc::new(e)))?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        let transport = Arc::new(Transport::new(
            http,
            self.auth_url,
            self.api_url,
            self.request_timeout,
            AuthSession::new(self.credentials),
            logger,
        ));
        let coordinator = Coordinator::with_callbacks(
            Arc::clone(&transport),
            RefreshSettings {
                refresh_interval: self.refresh_interval,
                cycle_timeout: self.cycle_timeout,
            },
            self.event_callbacks,
            self.snapshot_callbacks,
        );
        let commands =
            CommandDispatcher::new(Arc::clone(&transport), coordinator.clone(), self.refresh_delay);

        Ok(JouleClient {
            transport,
            coordinator,
            commands,
            command_options: self.command_options,
        })
    }
}

/// Cached, periodically refreshed view of every thermostat on one account.
pub struct JouleClient {
    transport: Arc<Transport>,
    coordinator: Coordinator,
    commands: CommandDispatcher,
    command_options: CommandOptions,
}

impl JouleClient {
    pub fn builder(credentials: Credentials) -> JouleClientBuilder {
        JouleClientBuilder::new(credentials)
    }

    pub async fn login(&self) -> Result<()> {
        self.transport.login().await
    }

    pub async fn refresh_now(&self) -> Result<Arc<Snapshot>> {
        self.coordinator.refresh_now().await
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.coordinator.current_snapshot()
    }

    pub fn get_device(&self, serial: &str) -> Result<Device> {
        self.coordinator.get_device(serial)
    }

    pub fn status(&self) -> RefreshStatus {
        self.coordinator.status()
    }

    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        self.coordinator.spawn_refresh_loop(cancel)
    }

    /// Set the target temperature using the configured comfort-mode options.
    pub async fn set_target_temperature(&self, serial: &str, temp: Temperature) -> Result<()> {
        self.commands
            .set_temperature(
                serial,
                temp,
                self.command_options.mode(),
                self.command_options.duration(),
            )
            .await
    }

    pub async fn set_temperature(
        &self,
        serial: &str,
        temp: Temperature,
        mode: Option<RegulationMode>,
        duration: Option<u32>,
    ) -> Result<()> {
        self.commands.set_temperature(serial, temp, mode, duration).await
    }

    pub async fn set_mode(&self, serial: &str, mode: RegulationMode) -> Result<()> {
        self.commands.set_mode(serial, mode).await
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn commands(&self) -> &CommandDispatcher {
        &self.commands
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }
}
