use std::future::Future;
use std::pin::Pin;

use crate::context::ExecContext;
use crate::error::Error;
use crate::executor::Executor;
use crate::store::DbStore;
use crate::tx::DbTx;

/// Runs `f` inside a transaction with `anyhow::Error` at the boundary.
///
/// Convenience variant of [`with_transaction`] for callers already living
/// in `anyhow` land: the closure may bubble any error, and the transaction
/// is doomed and rolled back when it does. Errors produced by this layer
/// itself keep their [`Error`] type inside the `anyhow::Error`, so
/// `downcast_ref::<Error>()` still works.
///
/// [`with_transaction`]: crate::with_transaction
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_instrumented_db::{with_transaction_anyhow, ConnectOptions, DbStore, Driver, ExecContext, Executor, Value};
///
/// # async fn example() -> anyhow::Result<()> {
/// # let store = DbStore::open(ConnectOptions::new(
/// #     Driver::MySql, "localhost", 3306, "test", "root", "secret",
/// # ))?;
/// with_transaction_anyhow(&store, ExecContext::new(), |tx| {
///     Box::pin(async move {
///         tx.exec("INSERT INTO users (name) VALUES (?)", &[Value::from("Alice")])
///             .await?;
///         Ok(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_transaction_anyhow<F, T>(
    store: &DbStore,
    ctx: ExecContext,
    f: F,
) -> anyhow::Result<T>
where
    F: for<'a> FnOnce(
        &'a mut DbTx,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>,
    T: Send,
{
    let mut tx = store.begin(ctx).await?;
    match f(&mut tx).await {
        Ok(value) => {
            tx.close().await?;
            Ok(value)
        }
        Err(err) => {
            // Doom the transaction with a layer-typed stand-in when the
            // closure's error is foreign; the caller still gets `err`.
            let doom = match err.downcast_ref::<Error>() {
                Some(layer_err) => layer_err.clone(),
                None => Error::Aborted(err.to_string()),
            };
            tx.set_error(doom);
            let _ = tx.close().await;
            Err(err)
        }
    }
}
