use std::time::Duration;

use {tokio::time::Instant, tokio_util::sync::CancellationToken};

/// Per-call deadline and cancellation signal supplied by the caller.
///
/// A context without a deadline falls back to the remote service's default
/// timeout. Cancelling the token aborts in-flight requests and ends any
/// subscription started with this context.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time budget for a request: the remaining time until the deadline,
    /// capped by `fallback` when no deadline was set.
    pub(crate) fn budget(&self, fallback: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => fallback,
        }
    }
}
