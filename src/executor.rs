use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::Any;

use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::store::DbStore;
use crate::tx::DbTx;
use crate::value::Value;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Auto-generated id of the last inserted row, when the driver
    /// reports one.
    pub last_insert_id: Option<i64>,
}

/// The capability contract shared by connections, transactions, and the
/// tracing decorator.
///
/// Anything that can run a parameterized statement satisfies this trait:
/// [`DbStore`] for standalone statements, [`DbTx`] for a unit of work, and
/// [`Traced`] wrapping either. Code written against `Executor` runs
/// unchanged inside or outside a transaction, traced or not.
///
/// [`Traced`]: crate::Traced
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_instrumented_db::{Executor, Result, Value};
///
/// async fn insert_user(db: &mut impl Executor, name: &str) -> Result<i64> {
///     let result = db
///         .exec(
///             "INSERT INTO users (name) VALUES (?)",
///             &[Value::from(name)],
///         )
///         .await?;
///     Ok(result.last_insert_id.unwrap_or_default())
/// }
/// ```
#[async_trait]
pub trait Executor: Send {
    /// Runs a read statement and returns the matching rows.
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<AnyRow>>;

    /// Runs a write statement.
    async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    /// Records a terminal error on the current unit of work. Dooms a
    /// transaction; a no-op on a standalone connection, which has no
    /// transaction state to doom.
    fn set_error(&mut self, err: Error);
}

/// Binds a `Value` slice onto an `Any` query in order.
pub(crate) fn bind_args<'q>(
    sql: &'q str,
    args: &'q [Value],
) -> sqlx::query::Query<'q, Any, AnyArguments<'q>> {
    let mut query = sqlx::query::<Any>(sql);
    for value in args {
        query = value.bind_to(query);
    }
    query
}

/// Drives a driver future under a context: an already-done context fails
/// the call without dispatching it, and cancellation or a passed deadline
/// mid-flight aborts it early.
pub(crate) async fn run_under_ctx<T>(
    ctx: &ExecContext,
    fut: impl Future<Output = std::result::Result<T, sqlx::Error>> + Send,
) -> Result<T> {
    if let Some(cause) = ctx.err() {
        return Err(cause);
    }
    if !ctx.is_observable() {
        return fut.await.map_err(Error::from_driver);
    }
    tokio::pin!(fut);
    tokio::select! {
        result = &mut fut => result.map_err(Error::from_driver),
        cause = ctx.done() => Err(cause),
    }
}

/// Runs `f` inside a transaction and finalizes it through the close
/// protocol.
///
/// A transaction is begun under `ctx`, handed to `f`, and closed when `f`
/// returns. An `Err` from `f` is recorded on the transaction first, so close
/// rolls back and surfaces it; an `Ok` commits unless an earlier call
/// already doomed the transaction or `ctx` was cancelled, in which case
/// close still rolls back.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_instrumented_db::{with_transaction, ConnectOptions, DbStore, Driver, ExecContext, Executor, Value};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = DbStore::open(ConnectOptions::new(
///     Driver::MySql, "localhost", 3306, "test", "root", "secret",
/// ))?;
///
/// with_transaction(&store, ExecContext::new(), |tx| {
///     Box::pin(async move {
///         tx.exec(
///             "INSERT INTO users (name) VALUES (?)",
///             &[Value::from("Alice")],
///         )
///         .await?;
///         Ok(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_transaction<F, T>(store: &DbStore, ctx: ExecContext, f: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut DbTx) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    T: Send,
{
    let mut tx = store.begin(ctx).await?;
    match f(&mut tx).await {
        Ok(value) => {
            tx.close().await?;
            Ok(value)
        }
        Err(err) => {
            tx.set_error(err.clone());
            // close rolls back and surfaces the recorded cause
            match tx.close().await {
                Err(surfaced) => Err(surfaced),
                Ok(()) => Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn pre_cancelled_context_never_dispatches() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ExecContext::new().with_cancellation(token);

        let dispatched = Arc::new(AtomicBool::new(false));
        let flag = dispatched.clone();
        let fut = async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, sqlx::Error>(42)
        };

        let result = run_under_ctx(&ctx, fut).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!dispatched.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_never_dispatches() {
        let ctx = ExecContext::new().with_timeout(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        let dispatched = Arc::new(AtomicBool::new(false));
        let flag = dispatched.clone();
        let fut = async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, sqlx::Error>(1)
        };

        let result = run_under_ctx(&ctx, fut).await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(!dispatched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn live_context_passes_the_result_through() {
        let ctx = ExecContext::new().with_cancellation(CancellationToken::new());
        let result = run_under_ctx(&ctx, async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
