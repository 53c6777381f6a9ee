use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::AnyPool;

use crate::context::ExecContext;
use crate::error::{Error, Result};
use crate::executor::{bind_args, ExecResult, Executor};
use crate::log::LogPolicy;
use crate::tx::DbTx;
use crate::value::Value;

/// Supported driver families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    MySql,
    Postgres,
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Driver::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            other => Err(Error::UnsupportedDriver(other.to_owned())),
        }
    }
}

/// Connection parameters handed to [`DbStore::open`].
///
/// The character set override only applies to MySQL; the Postgres DSN
/// format has no equivalent knob and ignores it.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    driver: Driver,
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
    charset: Option<String>,
}

impl ConnectOptions {
    pub fn new(
        driver: Driver,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            charset: None,
        }
    }

    /// Overrides the MySQL character set (default `utf8mb4`).
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub(crate) fn dsn(&self) -> String {
        match self.driver {
            Driver::MySql => format!(
                "mysql://{}:{}@{}:{}/{}?charset={}",
                self.username,
                self.password,
                self.host,
                self.port,
                self.database,
                self.charset.as_deref().unwrap_or("utf8mb4"),
            ),
            Driver::Postgres => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username, self.password, self.host, self.port, self.database,
            ),
        }
    }
}

/// Connection executor: owns the pool, applies the logging policy, and
/// hands out transactions.
///
/// Statements issued directly against the store run outside any
/// transaction. `close` invalidates the handle; every call after it fails
/// with [`Error::AlreadyClosed`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use sqlx_instrumented_db::{ConnectOptions, DbStore, Driver, Executor, Value};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut store = DbStore::open(ConnectOptions::new(
///     Driver::MySql, "localhost", 3306, "test", "root", "secret",
/// ))?;
/// store.debug(true);
/// store.slow_log(Duration::from_millis(50));
///
/// let rows = store
///     .query("SELECT id FROM users WHERE name = ?", &[Value::from("Alice")])
///     .await?;
/// println!("{} rows", rows.len());
///
/// store.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DbStore {
    pool: Option<AnyPool>,
    policy: LogPolicy,
}

impl DbStore {
    /// Builds a store from connection parameters.
    ///
    /// The pool is lazy: no connection is dialed until the first
    /// statement, so `open` only fails on an unusable configuration.
    pub fn open(options: ConnectOptions) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPool::connect_lazy(&options.dsn())
            .map_err(|e| Error::Connectivity(Arc::new(e)))?;
        Ok(Self {
            pool: Some(pool),
            policy: LogPolicy::default(),
        })
    }

    /// Wraps an existing pool. Useful when the caller already manages
    /// pool construction.
    pub fn from_pool(pool: AnyPool) -> Self {
        Self {
            pool: Some(pool),
            policy: LogPolicy::default(),
        }
    }

    /// Toggles per-statement `DEBUG` logging.
    pub fn debug(&mut self, enabled: bool) {
        self.policy.debug = enabled;
    }

    /// Sets the slow-query threshold. Zero disables slow logging.
    pub fn slow_log(&mut self, threshold: Duration) {
        self.policy.slowlog = threshold;
    }

    fn pool(&self) -> Result<&AnyPool> {
        self.pool.as_ref().ok_or(Error::AlreadyClosed)
    }

    /// Begins a transaction bound to `ctx`.
    ///
    /// The transaction snapshots the store's current debug flag and
    /// slow-query threshold; later setter calls on the store do not reach
    /// it.
    pub async fn begin(&self, ctx: ExecContext) -> Result<DbTx> {
        let tx = self
            .pool()?
            .begin()
            .await
            .map_err(|e| Error::TransactionStart(Arc::new(e)))?;
        Ok(DbTx::new(tx, self.policy, ctx))
    }

    /// Closes the pool and invalidates the handle. A second close fails
    /// with [`Error::AlreadyClosed`].
    pub async fn close(&mut self) -> Result<()> {
        match self.pool.take() {
            Some(pool) => {
                pool.close().await;
                Ok(())
            }
            None => Err(Error::AlreadyClosed),
        }
    }
}

#[async_trait]
impl Executor for DbStore {
    async fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<AnyRow>> {
        let pool = self.pool()?;
        self.policy.debug_line(sql, args);
        let started = tokio::time::Instant::now();
        let result = bind_args(sql, args).fetch_all(pool).await;
        self.policy.observe(sql, args, started.elapsed());
        result.map_err(Error::from_driver)
    }

    async fn exec(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let pool = self.pool()?;
        self.policy.debug_line(sql, args);
        let started = tokio::time::Instant::now();
        let result = bind_args(sql, args).execute(pool).await;
        self.policy.observe(sql, args, started.elapsed());
        let done = result.map_err(Error::from_driver)?;
        Ok(ExecResult {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_id(),
        })
    }

    /// A standalone connection has no unit of work to doom.
    fn set_error(&mut self, _err: Error) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_parses_known_names() {
        assert_eq!("mysql".parse::<Driver>().unwrap(), Driver::MySql);
        assert_eq!("MySQL".parse::<Driver>().unwrap(), Driver::MySql);
        assert_eq!("postgres".parse::<Driver>().unwrap(), Driver::Postgres);
        assert_eq!("pg".parse::<Driver>().unwrap(), Driver::Postgres);
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let err = "mssql".parse::<Driver>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedDriver(name) if name == "mssql"));
    }

    #[test]
    fn mysql_dsn_defaults_charset() {
        let options = ConnectOptions::new(Driver::MySql, "db.local", 3306, "app", "bob", "pw");
        assert_eq!(options.dsn(), "mysql://bob:pw@db.local:3306/app?charset=utf8mb4");
    }

    #[test]
    fn mysql_dsn_honors_charset_override() {
        let options = ConnectOptions::new(Driver::MySql, "db.local", 3306, "app", "bob", "pw")
            .charset("utf8");
        assert_eq!(options.dsn(), "mysql://bob:pw@db.local:3306/app?charset=utf8");
    }

    #[test]
    fn postgres_dsn_ignores_charset() {
        let options = ConnectOptions::new(Driver::Postgres, "db.local", 5432, "app", "bob", "pw")
            .charset("utf8");
        assert_eq!(options.dsn(), "postgres://bob:pw@db.local:5432/app");
    }

    #[tokio::test]
    async fn second_close_fails() {
        let options = ConnectOptions::new(Driver::MySql, "localhost", 3306, "t", "u", "p");
        let mut store = DbStore::open(options).unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.close().await, Err(Error::AlreadyClosed)));
    }

    #[tokio::test]
    async fn use_after_close_fails() {
        let options = ConnectOptions::new(Driver::MySql, "localhost", 3306, "t", "u", "p");
        let mut store = DbStore::open(options).unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.query("SELECT 1", &[]).await, Err(Error::AlreadyClosed)));
        assert!(matches!(store.begin(ExecContext::new()).await, Err(Error::AlreadyClosed)));
    }
}
