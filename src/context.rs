use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Request-scope value carried alongside every call: cancellation,
/// deadline, and the tracing span database spans should parent to.
///
/// An `ExecContext` is an explicit, cloneable value rather than thread-local
/// state, so cancellation and span lookup stay composable. The default
/// context carries nothing: calls made under it block without a cancellation
/// path and spans opened for it are roots.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use sqlx_instrumented_db::ExecContext;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main] async fn main() {
/// let token = CancellationToken::new();
/// let ctx = ExecContext::new()
///     .with_cancellation(token.clone())
///     .with_timeout(Duration::from_secs(5));
/// assert!(ctx.err().is_none());
///
/// token.cancel();
/// assert!(ctx.err().is_some());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    cancel: Option<CancellationToken>,
    deadline: Option<tokio::time::Instant>,
    span: Option<tracing::Span>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a cancellation token. Cancelling the token dooms any
    /// transaction closed under this context and aborts in-flight calls.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attaches an absolute deadline.
    pub fn with_deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attaches a deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.deadline = Some(tokio::time::Instant::now() + timeout);
        self
    }

    /// Attaches the span new database spans should be children of.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn span(&self) -> Option<&tracing::Span> {
        self.span.as_ref()
    }

    /// Synchronous done-check: returns the doom condition if the context
    /// has already been cancelled or its deadline has passed.
    pub fn err(&self) -> Option<Error> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Some(Error::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if deadline <= tokio::time::Instant::now() {
                return Some(Error::DeadlineExceeded);
            }
        }
        None
    }

    /// Whether the context can become done at all. Plain calls under an
    /// empty context skip the cancellation race entirely.
    pub(crate) fn is_observable(&self) -> bool {
        self.cancel.is_some() || self.deadline.is_some()
    }

    /// Resolves when the context is done, with the corresponding error.
    /// Pends forever for an empty context.
    pub(crate) async fn done(&self) -> Error {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline_passed = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = cancelled => Error::Cancelled,
            _ = deadline_passed => Error::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_context_is_never_done() {
        let ctx = ExecContext::new();
        assert!(ctx.err().is_none());
        assert!(!ctx.is_observable());
    }

    #[tokio::test]
    async fn cancelled_token_reports_cancelled() {
        let token = CancellationToken::new();
        let ctx = ExecContext::new().with_cancellation(token.clone());
        assert!(ctx.err().is_none());

        token.cancel();
        assert!(matches!(ctx.err(), Some(Error::Cancelled)));
        assert!(matches!(ctx.done().await, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn passed_deadline_reports_deadline_exceeded() {
        let ctx = ExecContext::new().with_timeout(Duration::from_millis(10));
        assert!(ctx.err().is_none());

        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(matches!(ctx.err(), Some(Error::DeadlineExceeded)));
        assert!(matches!(ctx.done().await, Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn done_pends_for_empty_context() {
        let ctx = ExecContext::new();
        let result = tokio::time::timeout(Duration::from_millis(10), ctx.done()).await;
        assert!(result.is_err());
    }
}
