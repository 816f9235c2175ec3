use crate::state::{Lease, State};

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tabular_spi::{Columns, Context, ExecResult, Result, RowCursor, Rows, Value};
use tracing::warn;

/// Cursor over a result of [`MemoryConn::query`](crate::MemoryConn).
///
/// Rows are pulled from the server `fetch_size` at a time; each pull is a
/// round trip that honours the caller's context.
pub struct MemoryRows {
    state: Arc<State>,
    cursor: RowCursor,
    remaining: VecDeque<Vec<Value>>,
    fetched: VecDeque<Vec<Value>>,
    fetch_size: usize,
    fetchable: bool,
    result: ExecResult,
    lease: Option<Lease>,
}

impl MemoryRows {
    pub(crate) fn fetching(
        state: Arc<State>,
        columns: Columns,
        rows: Vec<Vec<Value>>,
        fetch_size: usize,
        lease: Lease,
    ) -> Self {
        Self {
            state,
            cursor: RowCursor::new(columns),
            remaining: rows.into(),
            fetched: VecDeque::new(),
            fetch_size: fetch_size.max(1),
            fetchable: true,
            result: ExecResult::default(),
            lease: Some(lease),
        }
    }

    pub(crate) fn affected(state: Arc<State>, result: ExecResult) -> Self {
        let mut cursor = RowCursor::new(Columns::new());
        // Nothing to fetch; the cursor starts exhausted.
        let _ = cursor.advance(None);
        Self {
            state,
            cursor,
            remaining: VecDeque::new(),
            fetched: VecDeque::new(),
            fetch_size: 1,
            fetchable: false,
            result,
            lease: None,
        }
    }
}

#[async_trait]
impl Rows for MemoryRows {
    async fn next(&mut self, ctx: &Context) -> Result<bool> {
        if !self.cursor.is_open() {
            return Ok(false);
        }
        if self.fetched.is_empty() && !self.remaining.is_empty() {
            self.state.round_trip(ctx).await?;
            let batch = self.fetch_size.min(self.remaining.len());
            self.fetched.extend(self.remaining.drain(..batch));
        }
        let row = self.fetched.pop_front();
        self.cursor.advance(row)
    }

    fn values(&self) -> Result<&[Value]> {
        Ok(self.cursor.values()?)
    }

    async fn close(&mut self) -> Result<()> {
        self.cursor.close();
        self.remaining.clear();
        self.fetched.clear();
        if let Some(mut lease) = self.lease.take() {
            lease.release();
        }
        Ok(())
    }

    fn is_fetchable(&self) -> bool {
        self.fetchable
    }

    fn rows_affected(&self) -> u64 {
        self.result.rows_affected
    }

    fn message(&self) -> &str {
        &self.result.message
    }

    fn columns(&self) -> &Columns {
        self.cursor.columns()
    }
}

impl Drop for MemoryRows {
    fn drop(&mut self) {
        if let Some(lease) = &self.lease {
            warn!(lease = %lease.id(), "rows dropped without close");
        }
    }
}
