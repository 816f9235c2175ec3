use crate::state::{Lease, State};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tabular_spi::{
    AppendOptions, AppendSummary, Appender, Columns, Error, Result, TableType, UsageError, Value,
    check_arity,
};
use tracing::{debug, warn};

/// Bulk appender bound to one table of a memory server.
///
/// Rows are buffered and stored `buffer_rows` at a time. Type conversion
/// happens when a buffer is stored, so a row with a bad value is counted as
/// failed at that point rather than rejected by `append`.
pub struct MemoryAppender {
    state: Arc<State>,
    table: String,
    table_type: TableType,
    columns: Columns,
    options: AppendOptions,
    buffer: Vec<(DateTime<Utc>, Vec<Value>)>,
    success: u64,
    fail: u64,
    reason: Option<String>,
    lease: Option<Lease>,
}

impl MemoryAppender {
    pub(crate) fn new(
        state: Arc<State>,
        table: String,
        table_type: TableType,
        columns: Columns,
        options: AppendOptions,
        lease: Lease,
    ) -> Self {
        Self {
            state,
            table,
            table_type,
            columns,
            buffer: Vec::with_capacity(options.buffer_rows),
            options,
            success: 0,
            fail: 0,
            reason: None,
            lease: Some(lease),
        }
    }

    /// Rows stored and rejected so far, not counting the unflushed buffer.
    #[must_use]
    pub const fn summary(&self) -> AppendSummary {
        AppendSummary {
            success: self.success,
            fail: self.fail,
        }
    }

    fn push(&mut self, arrival: DateTime<Utc>, values: Vec<Value>) -> Result<()> {
        if self.lease.is_none() {
            return Err(UsageError::Closed("appender").into());
        }
        check_arity(&self.columns, &values)?;
        self.buffer.push((arrival, values));
        if self.buffer.len() >= self.options.buffer_rows {
            self.flush();
        }
        Ok(())
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.buffer);
        let flushed = self.state.append_rows(&self.table, rows, &self.options);
        debug!(
            table = %self.table,
            success = flushed.success,
            fail = flushed.fail,
            "flushed appended rows"
        );
        self.success += flushed.success;
        self.fail += flushed.fail;
        if self.reason.is_none() {
            self.reason = flushed.reason;
        }
    }
}

#[async_trait]
impl Appender for MemoryAppender {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn table_type(&self) -> TableType {
        self.table_type
    }

    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn append(&mut self, values: Vec<Value>) -> Result<()> {
        self.push(Utc::now(), values)
    }

    async fn append_with_timestamp(
        &mut self,
        ts: DateTime<Utc>,
        values: Vec<Value>,
    ) -> Result<()> {
        self.push(ts, values)
    }

    async fn close(&mut self) -> Result<AppendSummary> {
        let Some(mut lease) = self.lease.take() else {
            return Err(UsageError::Closed("appender").into());
        };
        self.flush();
        lease.release();

        let summary = self.summary();
        match self.reason.take() {
            Some(reason) if summary.fail > 0 => Err(Error::AppendRejected {
                success: summary.success,
                fail: summary.fail,
                reason,
            }),
            _ => Ok(summary),
        }
    }
}

impl Drop for MemoryAppender {
    fn drop(&mut self) {
        if let Some(lease) = &self.lease {
            warn!(
                lease = %lease.id(),
                table = %self.table,
                buffered = self.buffer.len(),
                "appender dropped without close; buffered rows discarded"
            );
        }
    }
}
