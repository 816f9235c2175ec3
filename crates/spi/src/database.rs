use crate::conn::{ConnectOptions, Conn};
use crate::context::Context;
use crate::error::Result;
use crate::info::{Inflight, Postflight, ServerInfo, ServicePort};

use std::time::Duration;

use async_trait::async_trait;

/// Factory of connections; the capability shared by server and client roles.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Connection type.
    type Conn: Conn;

    /// Opens a new connection.
    async fn connect(&self, ctx: &Context, options: ConnectOptions) -> Result<Self::Conn>;
}

/// A database that runs in-process and owns its lifecycle.
#[async_trait]
pub trait DatabaseServer: Database {
    /// Starts serving connections.
    async fn startup(&self) -> Result<()>;

    /// Stops serving. In-flight operations unwind with a cancellation error.
    async fn shutdown(&self) -> Result<()>;
}

/// A database reached through a client handle.
#[async_trait]
pub trait DatabaseClient: Database {
    /// Releases the client; connections opened afterwards fail.
    async fn close(&self);
}

/// Introspection of a running database.
#[async_trait]
pub trait DatabaseAux: Send + Sync {
    /// Version and runtime of the server process.
    async fn server_info(&self) -> Result<ServerInfo>;

    /// Statements currently executing.
    async fn inflights(&self) -> Result<Vec<Inflight>>;

    /// Aggregates of finished statements.
    async fn postflights(&self) -> Result<Vec<Postflight>>;

    /// Listening addresses of `service`, or of every service when empty.
    async fn service_ports(&self, service: &str) -> Result<Vec<ServicePort>>;
}

/// Execution plans.
#[async_trait]
pub trait Explainer: Send + Sync {
    /// Plan of `sql`; `full` adds per-column detail.
    async fn explain(&self, ctx: &Context, sql: &str, full: bool) -> Result<String>;
}

/// Authorization hook.
///
/// `Ok(false)` means the credentials were rejected; `Err` means the check
/// itself failed.
#[async_trait]
pub trait DatabaseAuth: Send + Sync {
    /// Checks `user` and `password`.
    async fn user_auth(&self, user: &str, password: &str) -> Result<bool>;
}

/// Liveness check.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Round-trip time of a no-op exchange.
    async fn ping(&self) -> Result<Duration>;
}
