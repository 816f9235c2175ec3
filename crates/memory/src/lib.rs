//! In-memory (single process) tabular database for tests and local development.
//!
//! Implements the server and client roles of the provider contract over a
//! small statement vocabulary:
//!
//! ```text
//! CREATE [LOG|FIXED|VOLATILE|LOOKUP|KEYVALUE|TAG] TABLE t (c type, ...)
//! DROP TABLE t
//! INSERT INTO t VALUES (?, ...)
//! DELETE FROM t
//! SELECT * FROM t [LIMIT n]
//! SELECT _ARRIVAL_TIME, * FROM t [LIMIT n]
//! SELECT COUNT(*) FROM t
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod appender;
mod client;
mod conn;
mod error;
mod options;
mod rows;
mod server;
mod state;
mod statement;

pub use appender::MemoryAppender;
pub use client::MemoryClient;
pub use conn::MemoryConn;
pub use error::Error;
pub use options::MemoryOptions;
pub use rows::MemoryRows;
pub use server::MemoryServer;
pub use statement::ARRIVAL_TIME;
