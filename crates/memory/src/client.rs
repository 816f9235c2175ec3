use crate::conn::MemoryConn;
use crate::state::State;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tabular_spi::{ConnectOptions, Context, Database, DatabaseClient, Result, UsageError};
use tracing::debug;

/// Client handle of a [`MemoryServer`](crate::MemoryServer).
///
/// Clones share the closed flag. Connections opened before `close` keep working.
#[derive(Clone)]
pub struct MemoryClient {
    state: Arc<State>,
    closed: Arc<AtomicBool>,
}

impl MemoryClient {
    pub(crate) fn new(state: Arc<State>) -> Self {
        Self {
            state,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Database for MemoryClient {
    type Conn = MemoryConn;

    async fn connect(&self, ctx: &Context, options: ConnectOptions) -> Result<MemoryConn> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(UsageError::Closed("client").into());
        }
        MemoryConn::open(Arc::clone(&self.state), ctx, options).await
    }
}

#[async_trait]
impl DatabaseClient for MemoryClient {
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("memory client closed");
        }
    }
}
