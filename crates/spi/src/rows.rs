use crate::column::{Cell, Columns};
use crate::context::Context;
use crate::error::{Error, Result, UsageError};
use crate::value::{FromRow, Value};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Forward-only cursor over the result of a statement.
///
/// A cursor holds server-side resources until [`Rows::close`] is called. `close`
/// may be called from any state and any number of times.
///
/// ```ignore
/// let mut rows = conn.query(&ctx, "SELECT * FROM users", &[]).await?;
/// while rows.next(&ctx).await? {
///     let (name, age): (String, i32) = rows.scan()?;
/// }
/// rows.close().await?;
/// ```
#[async_trait]
pub trait Rows: Send {
    /// Advances to the next row. Returns false once the result is exhausted.
    async fn next(&mut self, ctx: &Context) -> Result<bool>;

    /// Values of the current row.
    fn values(&self) -> Result<&[Value]>;

    /// Releases the cursor.
    async fn close(&mut self) -> Result<()>;

    /// True if the statement produced a result set (as opposed to an affected-row count).
    fn is_fetchable(&self) -> bool;

    /// Rows affected by a non-fetching statement.
    fn rows_affected(&self) -> u64;

    /// Server message for the statement.
    fn message(&self) -> &str;

    /// Columns of the result set. Stable for the lifetime of the cursor.
    fn columns(&self) -> &Columns;

    /// Copies the current row into a buffer from [`Columns::make_buffer`].
    fn scan_into(&self, dest: &mut [Cell]) -> Result<()> {
        let values = self.values()?;
        Ok(self.columns().scan_into(values, dest)?)
    }

    /// Extracts the current row as `T`, usually a tuple.
    fn scan<T: FromRow>(&self) -> Result<T>
    where
        Self: Sized,
    {
        let values = self.values()?;
        Ok(T::from_row(self.columns(), values)?)
    }
}

/// Position of a [`RowCursor`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CursorState {
    /// `next` was never called.
    Unstarted,
    /// On a row; values can be read.
    Positioned,
    /// `next` returned false.
    Exhausted,
    /// `close` was called.
    Closed,
}

/// Cursor state machine for providers to embed in their [`Rows`] implementations.
#[derive(Debug)]
pub struct RowCursor {
    columns: Columns,
    current: Vec<Value>,
    fetched: u64,
    state: CursorState,
}

impl RowCursor {
    /// Creates an unstarted cursor over `columns`.
    #[must_use]
    pub const fn new(columns: Columns) -> Self {
        Self {
            columns,
            current: Vec::new(),
            fetched: 0,
            state: CursorState::Unstarted,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Columns of the result.
    #[must_use]
    pub const fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Number of rows positioned on so far.
    #[must_use]
    pub const fn fetched(&self) -> u64 {
        self.fetched
    }

    /// True when the cursor can still produce rows.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, CursorState::Unstarted | CursorState::Positioned)
    }

    /// Moves onto `row`, or to `Exhausted` for `None`. Returns what `next` should return.
    ///
    /// Exhausted and closed cursors stay where they are and return false.
    pub fn advance(&mut self, row: Option<Vec<Value>>) -> Result<bool> {
        if !self.is_open() {
            return Ok(false);
        }
        match row {
            Some(values) => {
                if values.len() != self.columns.len() {
                    return Err(Error::Server(format!(
                        "row has {} values for {} columns",
                        values.len(),
                        self.columns.len()
                    )));
                }
                self.current = values;
                self.fetched += 1;
                self.state = CursorState::Positioned;
                Ok(true)
            }
            None => {
                self.current.clear();
                self.state = CursorState::Exhausted;
                Ok(false)
            }
        }
    }

    /// Values of the current row.
    pub fn values(&self) -> Result<&[Value], UsageError> {
        match self.state {
            CursorState::Positioned => Ok(&self.current),
            CursorState::Unstarted => Err(UsageError::NotPositioned),
            CursorState::Exhausted => Err(UsageError::Exhausted),
            CursorState::Closed => Err(UsageError::Closed("rows")),
        }
    }

    /// Moves to `Closed`. Returns true only for the first call.
    pub fn close(&mut self) -> bool {
        if self.state == CursorState::Closed {
            return false;
        }
        self.current.clear();
        self.state = CursorState::Closed;
        true
    }
}

/// Outcome of a statement that does not fetch rows.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExecResult {
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,

    /// Server message.
    pub message: String,
}

impl ExecResult {
    /// Creates a result with `rows_affected` and `message`.
    pub fn new(rows_affected: u64, message: impl Into<String>) -> Self {
        Self {
            rows_affected,
            message: message.into(),
        }
    }
}

/// A single materialized row, as returned by `query_row`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Row {
    columns: Columns,
    values: Vec<Value>,
    rows_affected: u64,
    message: String,
}

impl Row {
    /// Creates a row; `values` must match `columns` in length.
    pub fn new(columns: Columns, values: Vec<Value>) -> Result<Self, UsageError> {
        if values.len() != columns.len() {
            return Err(UsageError::ArityMismatch {
                expected: columns.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            columns,
            values,
            rows_affected: 0,
            message: String::new(),
        })
    }

    /// A row without values, carrying the outcome of a non-fetching statement.
    #[must_use]
    pub fn affected(result: ExecResult) -> Self {
        Self {
            columns: Columns::new(),
            values: Vec::new(),
            rows_affected: result.rows_affected,
            message: result.message,
        }
    }

    /// Sets the server message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Columns of the row.
    #[must_use]
    pub const fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Values of the row.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Extracts the row as `T`.
    pub fn scan<T: FromRow>(&self) -> Result<T> {
        Ok(T::from_row(&self.columns, &self.values)?)
    }

    /// Copies the row into a buffer from [`Columns::make_buffer`].
    pub fn scan_into(&self, dest: &mut [Cell]) -> Result<()> {
        Ok(self.columns.scan_into(&self.values, dest)?)
    }

    /// Rows affected by the statement.
    #[must_use]
    pub const fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Server message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Reads the first row of `rows` into a [`Row`] without closing the cursor.
///
/// Non-fetching statements yield a value-less row with their affected count.
pub async fn first_row<R: Rows + ?Sized>(ctx: &Context, rows: &mut R) -> Result<Row> {
    if !rows.is_fetchable() {
        return Ok(Row::affected(ExecResult::new(
            rows.rows_affected(),
            rows.message(),
        )));
    }
    if !rows.next(ctx).await? {
        return Err(Error::NoRows);
    }
    let row = Row::new(rows.columns().clone(), rows.values()?.to_vec())?;
    Ok(row.with_message(rows.message()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::column::{Column, ColumnType};

    fn cursor() -> RowCursor {
        RowCursor::new(Columns::from(vec![
            Column::new("name", ColumnType::String),
            Column::new("age", ColumnType::Int32),
        ]))
    }

    #[test]
    fn test_values_before_next_is_usage_error() {
        let cursor = cursor();
        assert_eq!(cursor.values().unwrap_err(), UsageError::NotPositioned);
    }

    #[test]
    fn test_state_transitions() {
        let mut cursor = cursor();

        let positioned = cursor
            .advance(Some(vec![Value::from("alice"), Value::Int32(30)]))
            .unwrap();
        assert!(positioned);
        assert_eq!(cursor.state(), CursorState::Positioned);
        assert_eq!(cursor.values().unwrap()[1], Value::Int32(30));

        assert!(!cursor.advance(None).unwrap());
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert_eq!(cursor.values().unwrap_err(), UsageError::Exhausted);

        // Exhausted cursors stay exhausted.
        assert!(!cursor.advance(Some(vec![Value::Null, Value::Null])).unwrap());
        assert_eq!(cursor.fetched(), 1);

        assert!(cursor.close());
        assert!(!cursor.close());
        assert_eq!(cursor.values().unwrap_err(), UsageError::Closed("rows"));
    }

    #[test]
    fn test_advance_rejects_wrong_width() {
        let mut cursor = cursor();
        let err = cursor.advance(Some(vec![Value::Null])).unwrap_err();
        assert!(matches!(err, Error::Server(_)));
        assert_eq!(cursor.state(), CursorState::Unstarted);
    }

    #[test]
    fn test_row_scan() {
        let row = Row::new(
            cursor().columns().clone(),
            vec![Value::from("bob"), Value::Int32(41)],
        )
        .unwrap();
        let (name, age): (String, i64) = row.scan().unwrap();
        assert_eq!(name, "bob");
        assert_eq!(age, 41);

        let mut buffer = row.columns().make_buffer();
        row.scan_into(&mut buffer).unwrap();
        assert_eq!(buffer[0], Cell::Text(Some("bob".to_string())));
    }

    #[test]
    fn test_row_width_checked() {
        let err = Row::new(cursor().columns().clone(), vec![Value::Null]).unwrap_err();
        assert!(matches!(err, UsageError::ArityMismatch { expected: 2, actual: 1 }));
    }
}
