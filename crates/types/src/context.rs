//! Per-call cancellation and deadlines.
//!
//! Every store operation takes a [`Context`]. It is checked once the
//! operation holds its lock and before it touches the engine; an operation
//! that has started runs to completion.

use std::time::{Duration, Instant};

use snafu::Snafu;
use tokio_util::sync::CancellationToken;

/// Why a context refused to let an operation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum ContextError {
    /// The caller cancelled the context.
    #[snafu(display("operation cancelled"))]
    Cancelled,
    /// The context deadline passed.
    #[snafu(display("deadline exceeded"))]
    DeadlineExceeded,
}

/// Cancellation token plus an optional deadline.
///
/// Cloning shares the token: cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self { token: CancellationToken::new(), deadline: Some(deadline) }
    }

    /// Wraps an existing token, e.g. one owned by a shutdown coordinator.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// Derives a context cancelled with this one but independently
    /// cancellable, keeping the earlier of the two deadlines.
    #[must_use]
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { token: self.token.child_token(), deadline }
    }

    /// Cancels this context and every child.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns an error if the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// [`ContextError::Cancelled`] takes precedence over
    /// [`ContextError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(ContextError::DeadlineExceeded);
        }
        Ok(())
    }
}
