use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::{Any, Transaction};

use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::executor::{bind_args, run_under_ctx, ExecResult, Executor};
use crate::log::LogPolicy;
use crate::value::Value;

/// Transaction executor: one serial unit of work bound to an execution
/// context.
///
/// Created only by [`DbStore::begin`]. Every query/exec that fails records
/// the failure, and the recorded error is sticky: once the transaction is
/// doomed, later successful calls do not un-doom it. [`close`] is the single
/// terminal operation; it consumes the transaction, so nothing can run
/// against it afterwards. Dropping without `close` rolls back.
///
/// [`DbStore::begin`]: crate::DbStore::begin
/// [`close`]: DbTx::close
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_instrumented_db::{ConnectOptions, DbStore, Driver, ExecContext, Executor, Value};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let store = DbStore::open(ConnectOptions::new(
/// #     Driver::MySql, "localhost", 3306, "test", "root", "secret",
/// # ))?;
/// let mut tx = store.begin(ExecContext::new()).await?;
/// tx.exec("UPDATE accounts SET balance = balance - 10 WHERE id = ?", &[Value::from(1)])
///     .await?;
/// tx.exec("UPDATE accounts SET balance = balance + 10 WHERE id = ?", &[Value::from(2)])
///     .await?;
/// tx.close().await?; // commits: nothing went wrong
/// # Ok(())
/// # }
/// ```
pub struct DbTx {
    tx: Transaction<'static, Any>,
    policy: LogPolicy,
    ctx: ExecContext,
    err: Option<Error>,
    rows_affected: u64,
}

/// Decides what dooms the transaction at close time. A done context takes
/// precedence over any recorded error; `None` means commit.
fn terminal_cause(ctx: &ExecContext, recorded: Option<&Error>) -> Option<Error> {
    ctx.err().or_else(|| recorded.cloned())
}

/// Sticky recording: the first error wins, later ones are dropped and
/// success never clears the slot.
fn record_first(slot: &mut Option<Error>, err: Error) {
    if slot.is_none() {
        *slot = Some(err);
    }
}

impl DbTx {
    pub(crate) fn new(tx: Transaction<'static, Any>, policy: LogPolicy, ctx: ExecContext) -> Self {
        Self {
            tx,
            policy,
            ctx,
            err: None,
            rows_affected: 0,
        }
    }

    /// Replaces the execution context for subsequent calls and for the
    /// close decision.
    pub fn set_context(&mut self, ctx: ExecContext) {
        self.ctx = ctx;
    }

    /// Total rows affected by execs on this transaction so far.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// The error currently dooming this transaction, if any.
    pub fn error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn record(&mut self, err: Error) {
        record_first(&mut self.err, err);
    }

    /// Finalizes the unit of work: rollback when doomed, commit otherwise.
    ///
    /// A cancelled or expired context dooms the transaction even if every
    /// individual call succeeded, as does any recorded error. On rollback,
    /// the surfaced error is the doom cause; a rollback that itself fails
    /// surfaces [`Error::Rollback`] with the cause attached. On a clean
    /// close, a failed commit surfaces [`Error::Commit`].
    pub async fn close(self) -> Result<()> {
        match terminal_cause(&self.ctx, self.err.as_ref()) {
            Some(cause) => match self.tx.rollback().await {
                Ok(()) => Err(cause),
                Err(e) => Err(Error::Rollback {
                    source: Arc::new(e),
                    cause: Box::new(cause),
                }),
            },
            None => self
                .tx
                .commit()
                .await
                .map_err(|e| Error::Commit(Arc::new(e))),
        }
    }
}

#[async_trait]
impl Executor for DbTx {
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<AnyRow>> {
        self.policy.debug_line(sql, args);
        let started = tokio::time::Instant::now();
        let result = run_under_ctx(&self.ctx, bind_args(sql, args).fetch_all(&mut *self.tx)).await;
        self.policy.observe(sql, args, started.elapsed());
        match result {
            Ok(rows) => Ok(rows),
            Err(err) => {
                self.record(err.clone());
                Err(err)
            }
        }
    }

    async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.policy.debug_line(sql, args);
        let started = tokio::time::Instant::now();
        let result = run_under_ctx(&self.ctx, bind_args(sql, args).execute(&mut *self.tx)).await;
        self.policy.observe(sql, args, started.elapsed());
        match result {
            Ok(done) => {
                self.rows_affected += done.rows_affected();
                Ok(ExecResult {
                    rows_affected: done.rows_affected(),
                    last_insert_id: done.last_insert_id(),
                })
            }
            Err(err) => {
                self.record(err.clone());
                Err(err)
            }
        }
    }

    fn set_error(&mut self, err: Error) {
        self.record(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn clean_context_and_no_error_commits() {
        assert!(terminal_cause(&ExecContext::new(), None).is_none());
    }

    #[test]
    fn recorded_error_dooms() {
        let recorded = Error::Driver(Arc::new(sqlx::Error::RowNotFound));
        let cause = terminal_cause(&ExecContext::new(), Some(&recorded));
        assert!(matches!(cause, Some(Error::Driver(_))));
    }

    #[test]
    fn cancelled_context_takes_precedence_over_recorded_error() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ExecContext::new().with_cancellation(token);

        let recorded = Error::Driver(Arc::new(sqlx::Error::RowNotFound));
        let cause = terminal_cause(&ctx, Some(&recorded));
        assert!(matches!(cause, Some(Error::Cancelled)));
    }

    #[test]
    fn first_recorded_error_wins() {
        let mut slot = None;
        record_first(&mut slot, Error::Aborted("first".into()));
        record_first(&mut slot, Error::Driver(Arc::new(sqlx::Error::RowNotFound)));
        assert!(matches!(slot, Some(Error::Aborted(ref msg)) if msg == "first"));

        // And the first error is what dooms the close decision.
        let cause = terminal_cause(&ExecContext::new(), slot.as_ref());
        assert!(matches!(cause, Some(Error::Aborted(ref msg)) if msg == "first"));
    }

    #[test]
    fn cancelled_context_dooms_without_recorded_error() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ExecContext::new().with_cancellation(token);
        assert!(matches!(terminal_cause(&ctx, None), Some(Error::Cancelled)));
    }
}
