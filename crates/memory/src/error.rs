use thiserror::Error;

/// Errors raised inside the in-memory engine.
///
/// They cross the provider contract as [`tabular_spi::Error`]; everything but
/// contract errors becomes `Error::Server` with the message below.
#[derive(Debug, Error)]
pub enum Error {
    /// Statement outside the supported vocabulary.
    #[error("unsupported statement: `{0}`")]
    Unsupported(String),

    /// `CREATE TABLE` of an existing name.
    #[error("table `{0}` already exists")]
    TableExists(String),

    /// Reference to a missing table.
    #[error("table `{0}` does not exist")]
    TableNotFound(String),

    /// Statement that fetches rows given to `exec`.
    #[error("statement returns rows; use query")]
    Fetching,

    /// Placeholder count differs from the parameter count.
    #[error("{placeholders} placeholders for {params} parameters")]
    Params {
        /// Placeholders in the statement.
        placeholders: usize,
        /// Parameters supplied.
        params: usize,
    },

    /// The server was never started or has shut down.
    #[error("server is not running")]
    NotRunning,

    /// Error defined by the provider contract.
    #[error(transparent)]
    Spi(#[from] tabular_spi::Error),
}

impl From<tabular_spi::UsageError> for Error {
    fn from(e: tabular_spi::UsageError) -> Self {
        Self::Spi(e.into())
    }
}

impl From<Error> for tabular_spi::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Spi(e) => e,
            other => Self::Server(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_errors_pass_through() {
        let err: tabular_spi::Error = Error::Spi(tabular_spi::Error::UserCancel).into();
        assert!(err.is_cancel());

        let err: tabular_spi::Error = Error::TableNotFound("events".to_string()).into();
        assert_eq!(err.to_string(), "server error: table `events` does not exist");
    }
}
