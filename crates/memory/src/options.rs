use std::collections::BTreeMap;
use std::time::Duration;

use tabular_spi::ServicePort;

/// Settings of a [`MemoryServer`](crate::MemoryServer).
#[derive(Clone, Debug)]
pub struct MemoryOptions {
    /// Simulated network delay of every round trip (connect, statement, fetch).
    pub latency: Duration,

    /// Accepted credentials. When empty, connections need no credentials.
    pub users: BTreeMap<String, String>,

    /// Addresses reported by `service_ports`.
    pub service_ports: Vec<ServicePort>,

    /// Rows per fetch when the connection does not set a fetch size.
    pub default_fetch_size: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            users: BTreeMap::new(),
            service_ports: Vec::new(),
            default_fetch_size: 100,
        }
    }
}

impl MemoryOptions {
    /// Delays every server round trip by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Registers a user. Once any user exists, connections must authenticate.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(user.into(), password.into());
        self
    }

    /// Advertises `address` for `service`.
    #[must_use]
    pub fn with_service_port(
        mut self,
        service: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        self.service_ports.push(ServicePort::new(service, address));
        self
    }

    /// Sets the default fetch size (at least one row).
    #[must_use]
    pub fn with_default_fetch_size(mut self, rows: usize) -> Self {
        self.default_fetch_size = rows.max(1);
        self
    }

    /// Whether `user` may log in with `password`. Anyone may when no user is registered.
    #[must_use]
    pub fn authenticates(&self, user: &str, password: &str) -> bool {
        self.users.is_empty()
            || self
                .users
                .get(user)
                .is_some_and(|expected| expected == password)
    }
}
