use crate::column::Columns;
use crate::error::{Result, UsageError};
use crate::time::TimeFormat;
use crate::value::Value;

use std::fmt::{Display, Formatter, Result as FmtResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Storage class of a table.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TableType {
    /// Append-only log table.
    #[default]
    Log,
    /// Fixed table.
    Fixed,
    /// In-memory table.
    Volatile,
    /// Lookup table.
    Lookup,
    /// Key-value table.
    KeyValue,
    /// Tag (time series) table.
    Tag,
}

impl Display for TableType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Log => write!(f, "log"),
            Self::Fixed => write!(f, "fixed"),
            Self::Volatile => write!(f, "volatile"),
            Self::Lookup => write!(f, "lookup"),
            Self::KeyValue => write!(f, "keyvalue"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

/// Options applied when an appender is opened.
#[derive(Clone, Debug)]
pub struct AppendOptions {
    /// How integer and text values are read into datetime columns.
    pub time_format: TimeFormat,

    /// Zone for textual datetimes without an offset.
    pub time_location: Tz,

    /// Rows buffered before an implicit flush.
    pub buffer_rows: usize,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::default(),
            time_location: Tz::UTC,
            buffer_rows: 512,
        }
    }
}

impl AppendOptions {
    /// Overrides the datetime format.
    #[must_use]
    pub fn with_time_format(mut self, time_format: TimeFormat) -> Self {
        self.time_format = time_format;
        self
    }

    /// Overrides the zone used for textual datetimes.
    #[must_use]
    pub fn with_time_location(mut self, tz: Tz) -> Self {
        self.time_location = tz;
        self
    }

    /// Overrides the buffer size (at least one row).
    #[must_use]
    pub fn with_buffer_rows(mut self, rows: usize) -> Self {
        self.buffer_rows = rows.max(1);
        self
    }
}

/// Row counts reported when an appender is closed.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AppendSummary {
    /// Rows stored.
    pub success: u64,

    /// Rows rejected by the table.
    pub fail: u64,
}

/// Bulk-insert stream bound to one table.
///
/// Failure is per row: rows already accepted stay stored when others are
/// rejected. The appender holds a server-side lease until [`Appender::close`].
#[async_trait]
pub trait Appender: Send {
    /// Name of the bound table.
    fn table_name(&self) -> &str;

    /// Storage class of the bound table.
    fn table_type(&self) -> TableType;

    /// Columns of the bound table.
    fn columns(&self) -> &Columns;

    /// Buffers one row. A wrong number of values fails this call only.
    async fn append(&mut self, values: Vec<Value>) -> Result<()>;

    /// Buffers one row with an explicit event time instead of the ingestion time.
    async fn append_with_timestamp(&mut self, ts: DateTime<Utc>, values: Vec<Value>)
    -> Result<()>;

    /// Flushes buffered rows and releases the appender.
    ///
    /// If some rows were rejected the error is `Error::AppendRejected`, which
    /// carries both counts. Closing twice is a usage error.
    async fn close(&mut self) -> Result<AppendSummary>;
}

/// Checks that `values` has one entry per column.
pub fn check_arity(columns: &Columns, values: &[Value]) -> Result<(), UsageError> {
    if values.len() == columns.len() {
        Ok(())
    } else {
        Err(UsageError::ArityMismatch {
            expected: columns.len(),
            actual: values.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::column::{Column, ColumnType};

    #[test]
    fn test_arity() {
        let columns = Columns::from(vec![
            Column::new("id", ColumnType::Int64),
            Column::new("name", ColumnType::String),
        ]);

        assert!(check_arity(&columns, &[Value::Int64(1), Value::from("a")]).is_ok());
        assert_eq!(
            check_arity(&columns, &[Value::Int64(2)]).unwrap_err(),
            UsageError::ArityMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_options_builder() {
        let options = AppendOptions::default()
            .with_time_format(TimeFormat::Millis)
            .with_time_location(Tz::Asia__Seoul)
            .with_buffer_rows(0);

        assert_eq!(options.time_format, TimeFormat::Millis);
        assert_eq!(options.time_location, Tz::Asia__Seoul);
        assert_eq!(options.buffer_rows, 1);
    }
}
