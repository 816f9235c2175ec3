//! Diagnostic snapshots. Each call builds a fresh value; nothing is cached.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Version and runtime of a server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ServerInfo {
    /// Build version.
    pub version: Version,

    /// Process runtime.
    pub runtime: Runtime,
}

/// Build version of a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
    /// Commit the server was built from.
    pub git_sha: String,
    /// Build time.
    pub build_timestamp: String,
    /// Compiler used for the build.
    pub build_compiler: String,
    /// Storage engine identifier.
    pub engine: String,
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.git_sha.is_empty() {
            write!(f, " ({})", self.git_sha)?;
        }
        Ok(())
    }
}

/// Process runtime of a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Runtime {
    /// Operating system.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// Process id.
    pub pid: u32,
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// Available parallelism.
    pub processors: usize,
    /// Live async tasks.
    pub tasks: usize,
    /// Resident memory in bytes.
    pub mem_resident: u64,
    /// Virtual memory in bytes.
    pub mem_virtual: u64,
}

/// Kind of a tracked statement.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum StatementType {
    /// Schema change.
    Ddl,
    /// Insert or delete.
    Mutation,
    /// Row-fetching statement.
    Query,
    /// Bulk append.
    Append,
    /// Unrecognized statement.
    Unknown,
}

impl Display for StatementType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Ddl => write!(f, "ddl"),
            Self::Mutation => write!(f, "mutation"),
            Self::Query => write!(f, "query"),
            Self::Append => write!(f, "append"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A statement that is still executing (or a cursor/appender still open).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Inflight {
    /// Tracking id.
    pub id: String,
    /// Kind of statement.
    pub statement_type: StatementType,
    /// Statement text.
    pub sql_text: String,
    /// Time since the statement started.
    pub elapsed: Duration,
}

/// Aggregate of finished executions of one statement text.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Postflight {
    /// Statement text.
    pub sql_text: String,
    /// Completed executions.
    pub count: u64,
    /// Summed execution time.
    pub total_time: Duration,
}

/// A listening address of a service.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServicePort {
    /// Service name.
    pub service: String,
    /// Listening address.
    pub address: String,
}

impl ServicePort {
    /// Creates a port entry.
    pub fn new(service: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            address: address.into(),
        }
    }
}
