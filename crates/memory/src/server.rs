use crate::client::MemoryClient;
use crate::conn::MemoryConn;
use crate::options::MemoryOptions;
use crate::state::State;
use crate::statement::Statement;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tabular_spi::{
    ConnectOptions, Context, Database, DatabaseAuth, DatabaseAux, DatabaseServer, Explainer,
    Inflight, Pinger, Postflight, Result, Runtime, ServerInfo, ServicePort, Version,
};
use tracing::info;

/// In-process tabular database.
///
/// Tables live in memory and vanish with the last handle. The server starts
/// stopped; call [`DatabaseServer::startup`] before connecting.
#[derive(Clone)]
pub struct MemoryServer {
    state: Arc<State>,
}

impl MemoryServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            state: Arc::new(State::new(options)),
        }
    }

    /// Client handle sharing this server's tables.
    #[must_use]
    pub fn client(&self) -> MemoryClient {
        MemoryClient::new(Arc::clone(&self.state))
    }

    /// Cursors, appenders and statements currently holding a lease.
    #[must_use]
    pub fn open_leases(&self) -> usize {
        self.state.open_leases()
    }

    /// Options the server was built with.
    #[must_use]
    pub fn options(&self) -> &MemoryOptions {
        &self.state.options
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new(MemoryOptions::default())
    }
}

#[async_trait]
impl Database for MemoryServer {
    type Conn = MemoryConn;

    async fn connect(&self, ctx: &Context, options: ConnectOptions) -> Result<MemoryConn> {
        MemoryConn::open(Arc::clone(&self.state), ctx, options).await
    }
}

#[async_trait]
impl DatabaseServer for MemoryServer {
    async fn startup(&self) -> Result<()> {
        if self.state.start() {
            info!("memory server started");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.state.stop() {
            info!(open_leases = self.state.open_leases(), "memory server stopped");
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseAux for MemoryServer {
    async fn server_info(&self) -> Result<ServerInfo> {
        Ok(ServerInfo {
            version: version(),
            runtime: runtime(self.state.uptime()),
        })
    }

    async fn inflights(&self) -> Result<Vec<Inflight>> {
        Ok(self.state.inflights())
    }

    async fn postflights(&self) -> Result<Vec<Postflight>> {
        Ok(self.state.postflights())
    }

    async fn service_ports(&self, service: &str) -> Result<Vec<ServicePort>> {
        Ok(self
            .state
            .options
            .service_ports
            .iter()
            .filter(|port| service.is_empty() || port.service.eq_ignore_ascii_case(service))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Explainer for MemoryServer {
    async fn explain(&self, ctx: &Context, sql: &str, full: bool) -> Result<String> {
        let statement = Statement::parse(sql)?;
        self.state.round_trip(ctx).await?;
        Ok(self.state.explain(&statement, full)?)
    }
}

/// Without registered users every credential is accepted, as on connect.
#[async_trait]
impl DatabaseAuth for MemoryServer {
    async fn user_auth(&self, user: &str, password: &str) -> Result<bool> {
        self.state.ensure_running()?;
        Ok(self.state.options.authenticates(user, password))
    }
}

#[async_trait]
impl Pinger for MemoryServer {
    async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        self.state.round_trip(&Context::new()).await?;
        Ok(start.elapsed())
    }
}

fn version() -> Version {
    Version {
        major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or_default(),
        minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or_default(),
        patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or_default(),
        git_sha: option_env!("TABULAR_GIT_SHA").unwrap_or_default().to_string(),
        build_timestamp: option_env!("TABULAR_BUILD_TIMESTAMP")
            .unwrap_or_default()
            .to_string(),
        build_compiler: option_env!("TABULAR_BUILD_COMPILER")
            .unwrap_or("rustc")
            .to_string(),
        engine: "memory".to_string(),
    }
}

fn runtime(uptime: Duration) -> Runtime {
    let pid = std::process::id();
    let (mem_resident, mem_virtual) = process_memory(pid);
    Runtime {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        pid,
        uptime_secs: uptime.as_secs(),
        processors: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        tasks: tokio::runtime::Handle::try_current()
            .map_or(0, |handle| handle.metrics().num_alive_tasks()),
        mem_resident,
        mem_virtual,
    }
}

fn process_memory(pid: u32) -> (u64, u64) {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system
        .process(pid)
        .map_or((0, 0), |process| (process.memory(), process.virtual_memory()))
}
