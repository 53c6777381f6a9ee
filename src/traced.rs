use async_trait::async_trait;
use sqlx::any::AnyRow;
use tracing::Instrument;

use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::executor::{ExecResult, Executor};
use crate::log::interpolate;
use crate::value::Value;

/// Tracing decorator over any [`Executor`].
///
/// Borrows the wrapped executor for the duration of a logical request and
/// opens one span per query/exec: a child of the span carried on the
/// execution context when one is present, a root span otherwise. The span
/// is tagged with the display-interpolated statement; on failure the error
/// lands in the span's `error` field. Results and errors pass through
/// unchanged, and dropping the decorator never closes the wrapped executor.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_instrumented_db::{ConnectOptions, DbStore, Driver, ExecContext, Executor, Traced, Value};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let mut store = DbStore::open(ConnectOptions::new(
/// #     Driver::MySql, "localhost", 3306, "test", "root", "secret",
/// # ))?;
/// let request_span = tracing::info_span!("handle_request");
/// let ctx = ExecContext::new().with_span(request_span);
///
/// let mut traced = Traced::new(&mut store, ctx.clone());
/// traced
///     .query("SELECT id FROM users WHERE name = ?", &[Value::from("Alice")])
///     .await?;
///
/// // The same decorator shape fits a transaction:
/// let mut tx = store.begin(ctx.clone()).await?;
/// let mut traced_tx = Traced::new(&mut tx, ctx);
/// traced_tx.exec("DELETE FROM sessions", &[]).await?;
/// drop(traced_tx);
/// tx.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Traced<'a, E: Executor> {
    inner: &'a mut E,
    ctx: ExecContext,
}

impl<'a, E: Executor> Traced<'a, E> {
    pub fn new(inner: &'a mut E, ctx: ExecContext) -> Self {
        Self { inner, ctx }
    }

    fn query_span(&self, sql: &str, args: &[Value]) -> tracing::Span {
        let statement = interpolate(sql, args);
        match self.ctx.span() {
            Some(parent) => tracing::info_span!(
                parent: parent,
                "db.query",
                otel.kind = "client",
                db.statement = %statement,
                error = tracing::field::Empty,
            ),
            None => tracing::info_span!(
                parent: None,
                "db.query",
                otel.kind = "client",
                db.statement = %statement,
                error = tracing::field::Empty,
            ),
        }
    }

    fn exec_span(&self, sql: &str, args: &[Value]) -> tracing::Span {
        let statement = interpolate(sql, args);
        match self.ctx.span() {
            Some(parent) => tracing::info_span!(
                parent: parent,
                "db.exec",
                otel.kind = "client",
                db.statement = %statement,
                error = tracing::field::Empty,
            ),
            None => tracing::info_span!(
                parent: None,
                "db.exec",
                otel.kind = "client",
                db.statement = %statement,
                error = tracing::field::Empty,
            ),
        }
    }
}

#[async_trait]
impl<E: Executor> Executor for Traced<'_, E> {
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<AnyRow>> {
        let span = self.query_span(sql, args);
        let result = self.inner.query(sql, args).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.record("error", tracing::field::display(err));
        }
        result
    }

    async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let span = self.exec_span(sql, args);
        let result = self.inner.exec(sql, args).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.record("error", tracing::field::display(err));
        }
        result
    }

    /// Pure pass-through; recording an error is not a traced event.
    fn set_error(&mut self, err: Error) {
        self.inner.set_error(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Scripted executor: pops the front of `script` per call and records
    /// what reached it.
    struct MockExec {
        script: Vec<Result<ExecResult>>,
        seen_sql: Vec<String>,
        recorded: Option<Error>,
    }

    impl MockExec {
        fn new(script: Vec<Result<ExecResult>>) -> Self {
            Self {
                script,
                seen_sql: Vec::new(),
                recorded: None,
            }
        }
    }

    #[async_trait]
    impl Executor for MockExec {
        async fn query(&mut self, sql: &str, _args: &[Value]) -> Result<Vec<AnyRow>> {
            self.seen_sql.push(sql.to_owned());
            self.script.remove(0).map(|_| Vec::new())
        }

        async fn exec(&mut self, sql: &str, _args: &[Value]) -> Result<ExecResult> {
            self.seen_sql.push(sql.to_owned());
            self.script.remove(0)
        }

        fn set_error(&mut self, err: Error) {
            self.recorded = Some(err);
        }
    }

    #[tokio::test]
    async fn exec_results_pass_through() {
        let outcome = ExecResult {
            rows_affected: 3,
            last_insert_id: Some(7),
        };
        let mut inner = MockExec::new(vec![Ok(outcome)]);
        let mut traced = Traced::new(&mut inner, ExecContext::new());

        let got = traced.exec("UPDATE t SET x = ?", &[Value::from(1)]).await.unwrap();
        assert_eq!(got, outcome);
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let mut inner = MockExec::new(vec![Err(Error::Driver(Arc::new(
            sqlx::Error::RowNotFound,
        )))]);
        let mut traced = Traced::new(&mut inner, ExecContext::new());

        let err = traced.exec("DELETE FROM t", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
    }

    #[tokio::test]
    async fn statement_reaches_inner_executor_verbatim() {
        // The interpolated text is span decoration only; the wrapped
        // executor must see the placeholder form.
        let mut inner = MockExec::new(vec![Ok(ExecResult::default())]);
        let mut traced = Traced::new(&mut inner, ExecContext::new());

        let sql = "SELECT * FROM t WHERE a = ?";
        traced.query(sql, &[Value::from("x")]).await.unwrap();
        assert_eq!(inner.seen_sql, vec![sql.to_owned()]);
    }

    #[tokio::test]
    async fn set_error_forwards_to_inner() {
        let mut inner = MockExec::new(vec![]);
        let mut traced = Traced::new(&mut inner, ExecContext::new());

        traced.set_error(Error::AlreadyClosed);
        assert!(matches!(inner.recorded, Some(Error::AlreadyClosed)));
    }

    #[tokio::test]
    async fn decorator_works_under_a_parent_span() {
        let parent = tracing::info_span!("request");
        let ctx = ExecContext::new().with_span(parent);

        let mut inner = MockExec::new(vec![Ok(ExecResult::default())]);
        let mut traced = Traced::new(&mut inner, ctx);
        traced.exec("INSERT INTO t VALUES (?)", &[Value::from(1)]).await.unwrap();
    }
}
