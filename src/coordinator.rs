use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::diff::diff_snapshots;
use crate::protocol::{self, DEVICES_PATH};
use crate::transport::{Method, Transport};
use crate::types::{Device, Event, Snapshot};
use crate::{Error, Result};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
pub(crate) type SnapshotCallback = Box<dyn Fn(&Snapshot) + Send + Sync>;

type CycleOutcome = Result<Arc<Snapshot>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshStatus {
    pub state: RefreshState,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<Error>,
    pub consecutive_failures: u32,
}

impl RefreshStatus {
    pub fn last_update_success(&self) -> bool {
        self.last_error.is_none()
    }

    fn record_success(&mut self, at: Option<DateTime<Utc>>) {
        self.state = RefreshState::Idle;
        self.last_success_at = at;
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self, error: Error) {
        self.state = RefreshState::Idle;
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub refresh_interval: Duration,
    /// Upper bound on one whole cycle; `None` leaves only per-request timeouts.
    pub cycle_timeout: Option<Duration>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            cycle_timeout: Some(DEFAULT_CYCLE_TIMEOUT),
        }
    }
}

/// Process-wide cache of device state, refreshed by polling.
///
/// At most one refresh cycle runs at a time. Callers that ask for a refresh
/// while one is running wait for that cycle's outcome instead of starting
/// another. Readers always see the last fully published [`Snapshot`]; a failed
/// cycle leaves it untouched.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<Transport>,
    settings: RefreshSettings,
    snapshot: watch::Sender<Arc<Snapshot>>,
    status: watch::Sender<RefreshStatus>,
    inflight: Mutex<Option<watch::Receiver<Option<CycleOutcome>>>>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
}

impl Coordinator {
    pub fn new(transport: Arc<Transport>, settings: RefreshSettings) -> Self {
        Self::with_callbacks(transport, settings, Vec::new(), Vec::new())
    }

    pub(crate) fn with_callbacks(
        transport: Arc<Transport>,
        settings: RefreshSettings,
        event_callbacks: Vec<EventCallback>,
        snapshot_callbacks: Vec<SnapshotCallback>,
    ) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::default()));
        let (status, _) = watch::channel(RefreshStatus::default());
        Self {
            inner: Arc::new(Inner {
                transport,
                settings,
                snapshot,
                status,
                inflight: Mutex::new(None),
                event_callbacks,
                snapshot_callbacks,
            }),
        }
    }

    /// The last published snapshot. Never waits for a running cycle.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.snapshot.borrow())
    }

    pub fn get_device(&self, serial: &str) -> Result<Device> {
        self.current_snapshot()
            .get(serial)
            .cloned()
            .ok_or_else(|| Error::NotFound(serial.to_string()))
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot.subscribe()
    }

    pub fn status(&self) -> RefreshStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> RefreshState {
        self.inner.status.borrow().state
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.inner.transport
    }

    /// Run a refresh cycle, or join the one already running.
    ///
    /// The cycle runs on its own task and completes even if every caller
    /// stops waiting. A failed cycle is returned as `Err`; the previous
    /// snapshot stays published.
    pub async fn refresh_now(&self) -> Result<Arc<Snapshot>> {
        let mut rx = {
            let mut slot = self
                .inner
                .inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(rx) => {
                    trace!("joining in-flight refresh");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let outcome = {
                            let _slot = ClearInflight(&inner);
                            inner.run_cycle().await
                        };
                        tx.send_replace(Some(outcome));
                    });
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::RefreshAborted)?;
        match &*outcome {
            Some(result) => result.clone(),
            None => Err(Error::RefreshAborted),
        }
    }

    /// Spawn the fixed-interval refresh loop. See [`Coordinator::run_refresh_loop`].
    pub fn spawn_refresh_loop(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run_refresh_loop(cancel).await })
    }

    /// Refresh immediately, then again `refresh_interval` after each cycle
    /// finishes, until `cancel` fires. The next sleep only starts once the
    /// previous cycle's outcome is known.
    pub async fn run_refresh_loop(&self, cancel: CancellationToken) {
        let period = self.inner.settings.refresh_interval;
        debug!(interval = ?period, "refresh loop started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.refresh_now() => {
                    if let Err(e) = result {
                        warn!(error = %e, "scheduled refresh failed, keeping previous data");
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(period) => {}
            }
        }

        debug!("refresh loop stopped");
    }
}

struct ClearInflight<'a>(&'a Inner);

impl Drop for ClearInflight<'_> {
    fn drop(&mut self) {
        self.0
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Inner {
    async fn run_cycle(&self) -> CycleOutcome {
        self.status.send_modify(|s| s.state = RefreshState::Refreshing);
        let started = Instant::now();

        let fetched = match self.settings.cycle_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_devices())
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(limit))),
            None => self.fetch_devices().await,
        };

        match fetched {
            Ok(devices) => {
                let snapshot = Arc::new(Snapshot::new(devices, Utc::now()));
                let previous = self.snapshot.send_replace(Arc::clone(&snapshot));
                self.status
                    .send_modify(|s| s.record_success(snapshot.refreshed_at()));
                debug!(
                    devices = snapshot.len(),
                    elapsed = ?started.elapsed(),
                    "refresh cycle complete"
                );
                self.notify(&previous, &snapshot);
                Ok(snapshot)
            }
            Err(e) => {
                if e.is_auth() {
                    self.transport.session().invalidate().await;
                }
                self.status.send_modify(|s| s.record_failure(e.clone()));
                if self.status.borrow().consecutive_failures == 1 {
                    info!(error = %e, "thermostat data unavailable");
                }
                Err(e)
            }
        }
    }

    async fn fetch_devices(&self) -> Result<Vec<Device>> {
        self.transport.ensure_authenticated().await?;

        let listing = self
            .transport
            .request(DEVICES_PATH, Method::GET, &[], None)
            .await?;
        let items = listing
            .get("devices")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::MalformedResponse("device listing has no devices array".to_string())
            })?;

        let mut devices = Vec::with_capacity(items.len());
        for item in items {
            if is_blank(item) {
                continue;
            }
            let device = match Device::from_listing_record(item) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable device entry");
                    continue;
                }
            };
            let serial = device.serial_number.clone();
            match self.fetch_history(device).await {
                Ok(d) => devices.push(d),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!(serial = %serial, error = %e, "history fetch failed, device omitted this cycle");
                }
            }
        }
        Ok(devices)
    }

    async fn fetch_history(&self, device: Device) -> Result<Device> {
        let path = protocol::history_path(&device.device_guid);
        let data = self
            .transport
            .request(&path, Method::GET, &protocol::history_query(), None)
            .await?;
        device.merge_history(&data)
    }

    fn notify(&self, previous: &Snapshot, current: &Snapshot) {
        if !self.event_callbacks.is_empty() {
            let events = diff_snapshots(previous, current);
            if !events.is_empty() {
                debug!(count = events.len(), "device changes detected");
            }
            for event in &events {
                for cb in &self.event_callbacks {
                    guarded("event", || cb(event));
                }
            }
        }
        for cb in &self.snapshot_callbacks {
            guarded("snapshot", || cb(current));
        }
    }
}

/// A panicking callback must not take the published cycle outcome with it.
fn guarded(kind: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(callback = kind, "callback panicked");
    }
}

fn is_blank(item: &Value) -> bool {
    match item {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}
