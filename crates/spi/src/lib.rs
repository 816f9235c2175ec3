//! Provider contract for tabular database drivers.
//!
//! A [`Database`] hands out [`Conn`]ections; a connection executes statements,
//! opens forward-only [`Rows`] cursors and bulk [`Appender`]s. Cursors and
//! appenders hold server-side leases and must be closed. Every blocking call
//! takes a [`Context`] whose cancellation surfaces as [`Error::UserCancel`].
//!
//! Result sets move to and from external formats through [`RowsEncoder`] and
//! [`RowsDecoder`]; numeric series are drawn by a [`Renderer`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod appender;
mod codec;
mod column;
mod conn;
mod context;
mod database;
mod error;
mod info;
mod render;
mod rows;
mod time;
mod value;

pub use appender::{AppendOptions, AppendSummary, Appender, TableType, check_arity};
pub use codec::{
    DEFAULT_NULL_VALUE, DecoderContext, EncoderContext, RowsDecoder, RowsEncoder, Sink, Source,
    decode_into, encode_rows,
};
pub use column::{Cell, Column, ColumnType, Columns, StorageKind};
pub use conn::{ConnectOptions, Conn};
pub use context::Context;
pub use database::{
    Database, DatabaseAuth, DatabaseAux, DatabaseClient, DatabaseServer, Explainer, Pinger,
};
pub use error::{Error, Result, UsageError};
pub use info::{Inflight, Postflight, Runtime, ServerInfo, ServicePort, StatementType, Version};
pub use render::{Renderer, RenderingData};
pub use rows::{CursorState, ExecResult, Row, RowCursor, Rows, first_row};
pub use time::TimeFormat;
pub use value::{FromRow, FromValue, Value};

pub use chrono_tz::Tz;
