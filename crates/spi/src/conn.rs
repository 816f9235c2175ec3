use crate::appender::{AppendOptions, Appender};
use crate::context::Context;
use crate::error::Result;
use crate::rows::{ExecResult, Row, Rows, first_row};
use crate::value::Value;

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Options applied when a connection is opened.
///
/// `properties` carries provider-specific settings; the named fields are the
/// ones every provider understands.
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    /// User name presented to the authorization hook.
    pub user: Option<String>,

    /// Password presented to the authorization hook.
    pub password: Option<String>,

    /// Rows fetched per round trip by cursors (provider default when `None`).
    pub fetch_size: Option<usize>,

    /// Provider-specific settings.
    pub properties: BTreeMap<String, String>,
}

impl ConnectOptions {
    /// Sets the credentials.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the cursor fetch size (at least one row).
    #[must_use]
    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = Some(fetch_size.max(1));
        self
    }

    /// Adds a provider-specific setting.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Looks up a provider-specific setting.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// A session against one database.
///
/// A connection is used by one logical caller at a time. A cancelled call
/// leaves the connection usable for the next one.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Cursor type returned by [`Conn::query`].
    type Rows: Rows;

    /// Appender type returned by [`Conn::appender`].
    type Appender: Appender;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;

    /// Executes a statement that does not return rows (DDL, DML).
    async fn exec(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<ExecResult>;

    /// Executes a statement that returns rows. The cursor must be closed.
    async fn query(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Self::Rows>;

    /// Executes a statement expected to return a single row.
    ///
    /// Returns `Error::NoRows` when the result set is empty.
    async fn query_row(&self, ctx: &Context, sql: &str, params: &[Value]) -> Result<Row> {
        let mut rows = self.query(ctx, sql, params).await?;
        let row = first_row(ctx, &mut rows).await;
        let closed = rows.close().await;
        let row = row?;
        closed?;
        Ok(row)
    }

    /// Opens an appender bound to `table`. The appender must be closed.
    async fn appender(
        &self,
        ctx: &Context,
        table: &str,
        options: AppendOptions,
    ) -> Result<Self::Appender>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options() {
        let options = ConnectOptions::default()
            .with_user("sys", "manager")
            .with_fetch_size(0)
            .with_property("role", "reader");

        assert_eq!(options.user.as_deref(), Some("sys"));
        assert_eq!(options.fetch_size, Some(1));
        assert_eq!(options.property("role"), Some("reader"));
        assert_eq!(options.property("missing"), None);
    }
}
