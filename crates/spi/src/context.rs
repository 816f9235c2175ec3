//! Cancellation and deadline propagation for blocking operations.

use crate::error::{Error, Result};

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline, passed into every blocking call.
///
/// Cloning shares the token: cancelling any clone cancels all of them. Use
/// [`Context::child`] for a scope that can be cancelled on its own.
#[derive(Clone, Debug, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a context that is never done until cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Creates a context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new().deadline(deadline)
    }

    /// Sets (or tightens) the deadline to now + `timeout`.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Sets the deadline, keeping the earlier one if already set.
    #[must_use]
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A context cancelled together with this one, but cancellable on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and all its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token, for callers that select on it directly.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Remaining time before the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the cancellation error if the context is already done.
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::UserCancel);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns `Err` if the context is already done.
    pub fn check(&self) -> Result<()> {
        self.err().map_or(Ok(()), Err)
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Error::UserCancel,
                    () = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Error::UserCancel
            }
        }
    }

    /// Races `fut` against the context. The future is dropped when the context wins.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }
}
