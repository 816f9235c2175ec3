use crate::appender::MemoryAppender;
use crate::error::Error;
use crate::rows::MemoryRows;
use crate::state::{Outcome, State};
use crate::statement::Statement;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tabular_spi::{
    AppendOptions, Conn, ConnectOptions, Context, ExecResult, Result, StatementType, UsageError,
    Value,
};
use tracing::debug;

/// Connection to a memory server.
///
/// Every call is one round trip: it waits out the configured latency, racing
/// the caller's context and the server's shutdown. A cancelled call changes
/// nothing and leaves the connection usable.
pub struct MemoryConn {
    state: Arc<State>,
    user: Option<String>,
    fetch_size: usize,
    closed: AtomicBool,
}

impl MemoryConn {
    pub(crate) async fn open(
        state: Arc<State>,
        ctx: &Context,
        options: ConnectOptions,
    ) -> Result<Self> {
        state.round_trip(ctx).await?;

        let accepted = match (options.user.as_deref(), options.password.as_deref()) {
            (Some(user), Some(password)) => state.options.authenticates(user, password),
            _ => state.options.users.is_empty(),
        };
        if !accepted {
            debug!(user = ?options.user, "connection refused");
            return Err(tabular_spi::Error::Unauthorized);
        }

        let fetch_size = options
            .fetch_size
            .unwrap_or(state.options.default_fetch_size)
            .max(1);
        debug!(user = ?options.user, fetch_size, "connection opened");
        Ok(Self {
            state,
            user: options.user,
            fetch_size,
            closed: AtomicBool::new(false),
        })
    }

    /// User the connection authenticated as.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// True once [`Conn::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(UsageError::Closed("connection").into());
        }
        Ok(self.state.ensure_running()?)
    }
}

#[async_trait]
impl Conn for MemoryConn {
    type Rows = MemoryRows;
    type Appender = MemoryAppender;

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(user = ?self.user, "connection closed");
        }
        Ok(())
    }

    async fn exec(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<ExecResult> {
        self.check_open()?;
        let statement = Statement::parse(sql)?;
        if statement.is_fetchable() {
            return Err(Error::Fetching.into());
        }

        let mut lease = self.state.begin(statement.statement_type(), sql);
        self.state.round_trip(ctx).await?;
        let outcome = self.state.execute(&statement, params)?;
        lease.release();

        match outcome {
            Outcome::Affected(result) => Ok(result),
            Outcome::Fetched { .. } => Err(Error::Fetching.into()),
        }
    }

    async fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<MemoryRows> {
        self.check_open()?;
        let statement = Statement::parse(sql)?;

        let mut lease = self.state.begin(statement.statement_type(), sql);
        self.state.round_trip(ctx).await?;
        match self.state.execute(&statement, params)? {
            Outcome::Affected(result) => {
                lease.release();
                Ok(MemoryRows::affected(Arc::clone(&self.state), result))
            }
            Outcome::Fetched { columns, rows } => Ok(MemoryRows::fetching(
                Arc::clone(&self.state),
                columns,
                rows,
                self.fetch_size,
                lease,
            )),
        }
    }

    async fn appender(
        &self,
        ctx: &Context,
        table: &str,
        options: AppendOptions,
    ) -> Result<MemoryAppender> {
        self.check_open()?;
        let table = table.trim().to_ascii_lowercase();

        let lease = self
            .state
            .begin(StatementType::Append, &format!("APPEND INTO {table}"));
        self.state.round_trip(ctx).await?;
        let (table_type, columns) = self.state.describe(&table)?;
        debug!(table, %table_type, "appender opened");

        Ok(MemoryAppender::new(
            Arc::clone(&self.state),
            table,
            table_type,
            columns,
            options,
            lease,
        ))
    }
}
