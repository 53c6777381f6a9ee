use std::sync::Arc;

/// Error types for the instrumented database layer.
///
/// Driver errors are carried as `Arc<sqlx::Error>` so the whole enum is
/// `Clone`: a transaction keeps the first error it saw (the doom cause) and
/// hands the caller a clone at close time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The factory was given a driver name it does not know.
    #[error("unsupported database driver: {0}")]
    UnsupportedDriver(String),

    /// The connection or pool is unusable (I/O, TLS, pool exhaustion).
    #[error("database connectivity: {0}")]
    Connectivity(#[source] Arc<sqlx::Error>),

    /// The underlying engine rejected a statement (syntax, constraint,
    /// timeout, decode).
    #[error("driver error: {0}")]
    Driver(#[source] Arc<sqlx::Error>),

    /// The connection refused to begin a transaction.
    #[error("failed to start transaction: {0}")]
    TransactionStart(#[source] Arc<sqlx::Error>),

    /// Commit itself failed; the work may or may not have been applied.
    #[error("commit failed: {0}")]
    Commit(#[source] Arc<sqlx::Error>),

    /// Rollback of a doomed transaction failed. `cause` is the error that
    /// doomed the transaction in the first place and is what the caller
    /// should attribute the failure to.
    #[error("rollback failed: {source} (caused by: {cause})")]
    Rollback {
        source: Arc<sqlx::Error>,
        cause: Box<Error>,
    },

    /// The caller declared the unit of work failed via `set_error`.
    #[error("unit of work aborted: {0}")]
    Aborted(String),

    /// The handle was used after `close`.
    #[error("handle already closed")]
    AlreadyClosed,

    /// The execution context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The execution context's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Classifies a driver failure: transport-level breakage is
    /// connectivity, everything else is the engine talking back.
    pub(crate) fn from_driver(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::Connectivity(Arc::new(err)),
            _ => Error::Driver(Arc::new(err)),
        }
    }

    /// Walks to the error the caller should treat as the root failure:
    /// for a failed rollback that is the doom cause, not the rollback.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Rollback { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for all layer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_failures_are_connectivity() {
        let err = Error::from_driver(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "gone",
        )));
        assert!(matches!(err, Error::Connectivity(_)));

        let err = Error::from_driver(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, Error::Connectivity(_)));
    }

    #[test]
    fn engine_failures_are_driver() {
        let err = Error::from_driver(sqlx::Error::RowNotFound);
        assert!(matches!(err, Error::Driver(_)));
    }

    #[test]
    fn root_cause_unwraps_rollback() {
        let cause = Error::Driver(Arc::new(sqlx::Error::RowNotFound));
        let err = Error::Rollback {
            source: Arc::new(sqlx::Error::PoolClosed),
            cause: Box::new(cause),
        };
        assert!(matches!(err.root_cause(), Error::Driver(_)));
        assert!(matches!(Error::AlreadyClosed.root_cause(), Error::AlreadyClosed));
    }
}
