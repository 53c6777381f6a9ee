use std::time::Duration;

use sqlx_instrumented_db::{
    ConnectOptions, DbStore, Driver, ExecContext, Executor, Traced, Value,
};
use tokio_util::sync::CancellationToken;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx_instrumented_db=debug".into()),
        )
        .init();

    let options = ConnectOptions::new(
        env_or("DB_DRIVER", "mysql").parse::<Driver>()?,
        env_or("DB_HOST", "localhost"),
        env_or("DB_PORT", "3306").parse()?,
        env_or("DB_NAME", "test"),
        env_or("DB_USER", "root"),
        env_or("DB_PASS", ""),
    );
    let mut store = DbStore::open(options)?;

    println!("=== Tracing Decorator ===\n");

    // A request-level span; database spans become its children.
    let request_span = tracing::info_span!("handle_request", request_id = 42);
    let ctx = ExecContext::new().with_span(request_span);

    // 1. Decorating the store
    println!("1. Traced standalone query...");
    {
        let mut traced = Traced::new(&mut store, ctx.clone());
        let rows = traced
            .query("SELECT id FROM users WHERE name = ?", &[Value::from("Alice")])
            .await?;
        println!("   ✓ {} rows, span closed\n", rows.len());
    }

    // 2. Decorating a transaction with a cancellable context
    println!("2. Traced transaction with cancellation...");
    let token = CancellationToken::new();
    let tx_ctx = ctx
        .clone()
        .with_cancellation(token.clone())
        .with_timeout(Duration::from_secs(5));

    let mut tx = store.begin(tx_ctx.clone()).await?;
    {
        let mut traced = Traced::new(&mut tx, tx_ctx);
        traced
            .exec(
                "INSERT INTO audit_log (action) VALUES (?)",
                &[Value::from("demo")],
            )
            .await?;
    }

    // Cancelling before close forces a rollback even though every call
    // succeeded.
    token.cancel();
    match tx.close().await {
        Ok(()) => println!("   ✗ Should have rolled back!"),
        Err(e) => println!("   ✓ Close rolled back: {e}\n"),
    }

    println!("=== Done ===");

    store.close().await?;
    Ok(())
}
