mod auth;
mod client;
mod command;
mod coordinator;
mod diff;
mod error;
mod logger;
mod protocol;
pub mod sensor;
mod transport;
mod types;

pub use auth::{AuthSession, Credentials};
pub use client::{JouleClient, JouleClientBuilder};
pub use command::{CommandDispatcher, CommandOptions, DEFAULT_REFRESH_DELAY};
pub use coordinator::{
    Coordinator, RefreshSettings, RefreshState, RefreshStatus, DEFAULT_CYCLE_TIMEOUT,
    DEFAULT_REFRESH_INTERVAL,
};
pub use error::{ApiFailure, Error, Result};
pub use logger::MessageLogMode;
pub use transport::{Method, Transport, DEFAULT_REQUEST_TIMEOUT};
pub use types::*;
