//! # sqlx-instrumented-db
//!
//! An instrumented database layer for SQLx: uniform query/exec operations
//! with debug and slow-query logging, tracing spans, and context-aware
//! transaction lifecycle.
//!
//! ## Features
//!
//! - **One capability contract**: connections, transactions, and the tracing
//!   decorator all implement [`Executor`], so calling code does not care
//!   which one it holds
//! - **Doomed-transaction semantics**: any failed call (or an explicit
//!   [`Executor::set_error`]) dooms the unit of work; [`DbTx::close`] then
//!   rolls back no matter what happened afterwards
//! - **Context-aware**: an [`ExecContext`] carries cancellation, a deadline,
//!   and a parent tracing span; cancelling it aborts in-flight calls and
//!   forces rollback at close
//! - **Instrumentation, not policy**: `DEBUG` and `SLOW` lines are `tracing`
//!   events, spans follow OpenTelemetry field conventions, and nothing in
//!   this layer retries or rewrites statements
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sqlx-instrumented-db = "0.2"
//! ```
//!
//! ### Standalone statements
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sqlx_instrumented_db::{ConnectOptions, DbStore, Driver, Executor, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = DbStore::open(ConnectOptions::new(
//!     Driver::MySql, "localhost", 3306, "test", "root", "secret",
//! ))?;
//! store.debug(true);
//! store.slow_log(Duration::from_millis(50));
//!
//! let rows = store
//!     .query("SELECT id, name FROM users WHERE name = ?", &[Value::from("Alice")])
//!     .await?;
//! println!("{} rows", rows.len());
//!
//! store.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Transactions
//!
//! ```rust,no_run
//! use sqlx_instrumented_db::{with_transaction, ConnectOptions, DbStore, Driver, ExecContext, Executor, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let store = DbStore::open(ConnectOptions::new(
//! #     Driver::MySql, "localhost", 3306, "test", "root", "secret",
//! # ))?;
//! with_transaction(&store, ExecContext::new(), |tx| {
//!     Box::pin(async move {
//!         tx.exec("INSERT INTO users (name) VALUES (?)", &[Value::from("Bob")])
//!             .await?;
//!         tx.exec("INSERT INTO profiles (user_id) VALUES (?)", &[Value::from(1)])
//!             .await?;
//!         Ok(())
//!     })
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Manual transaction control
//!
//! ```rust,no_run
//! use sqlx_instrumented_db::{ConnectOptions, DbStore, Driver, ExecContext, Executor, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let store = DbStore::open(ConnectOptions::new(
//! #     Driver::MySql, "localhost", 3306, "test", "root", "secret",
//! # ))?;
//! let mut tx = store.begin(ExecContext::new()).await?;
//!
//! let result = tx
//!     .exec("DELETE FROM sessions WHERE expired = ?", &[Value::from(true)])
//!     .await;
//! if result.is_err() {
//!     // The transaction is already doomed; close rolls back and
//!     // surfaces the failure as the cause.
//! }
//!
//! tx.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Tracing
//!
//! Wrap either executor in [`Traced`] to get one span per statement,
//! parented to whatever span the request carries:
//!
//! ```rust,no_run
//! use sqlx_instrumented_db::{ConnectOptions, DbStore, Driver, ExecContext, Executor, Traced, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut store = DbStore::open(ConnectOptions::new(
//! #     Driver::MySql, "localhost", 3306, "test", "root", "secret",
//! # ))?;
//! let ctx = ExecContext::new().with_span(tracing::info_span!("handle_request"));
//! let mut traced = Traced::new(&mut store, ctx);
//! traced.query("SELECT 1", &[]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How close decides
//!
//! [`DbTx::close`] asks one question: did anything go wrong during the unit
//! of work? A cancelled or expired context counts as something going wrong,
//! and takes precedence over everything else. Any recorded error counts,
//! even if later calls succeeded. Only a transaction with a live context and
//! no recorded error commits. This is deliberate: a transaction must not
//! commit partial work just because the caller ignored an earlier failed
//! step's result.
//!
//! ## Logging
//!
//! With the debug flag set, each statement emits a `DEBUG` event carrying
//! the statement text and argument list. With a non-zero slow-query
//! threshold, any call whose measured duration strictly exceeds it emits a
//! `SLOW` event with the elapsed time. Both go to the process's `tracing`
//! subscriber and are best-effort: a missing subscriber never fails a query.
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at
//! your option.

pub mod context;
pub mod error;
pub mod executor;
mod log;
pub mod store;
pub mod traced;
pub mod tx;
pub mod value;

#[cfg(feature = "anyhow")]
pub mod anyhow_compat;

pub use context::ExecContext;
pub use error::{Error, Result};
pub use executor::{with_transaction, ExecResult, Executor};
pub use store::{ConnectOptions, DbStore, Driver};
pub use traced::Traced;
pub use tx::DbTx;
pub use value::Value;

#[cfg(feature = "anyhow")]
pub use anyhow_compat::with_transaction_anyhow;

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::context::ExecContext;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{with_transaction, ExecResult, Executor};
    pub use crate::store::{ConnectOptions, DbStore, Driver};
    pub use crate::traced::Traced;
    pub use crate::tx::DbTx;
    pub use crate::value::Value;

    #[cfg(feature = "anyhow")]
    pub use crate::anyhow_compat::with_transaction_anyhow;
}
