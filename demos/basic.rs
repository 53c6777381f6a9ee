use std::time::Duration;

use sqlx_instrumented_db::{
    with_transaction, ConnectOptions, DbStore, Driver, ExecContext, Executor, Value,
};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlx_instrumented_db=debug".into()),
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
    store.debug(true);
    store.slow_log(Duration::from_millis(50));

    println!("=== Basic Usage ===\n");

    // Example 1: standalone statement (no transaction)
    println!("1. Creating a user outside a transaction...");
    store
        .exec(
            "INSERT INTO users (name, email) VALUES (?, ?)",
            &[Value::from("Alice"), Value::from("alice@example.com")],
        )
        .await?;
    println!("   ✓ User created\n");

    // Example 2: multiple operations in one transaction
    println!("2. Creating user with profile...");
    let user_id = with_transaction(&store, ExecContext::new(), |tx| {
        Box::pin(async move {
            let result = tx
                .exec(
                    "INSERT INTO users (name, email) VALUES (?, ?)",
                    &[Value::from("Bob"), Value::from("bob@example.com")],
                )
                .await?;
            let user_id = result.last_insert_id.unwrap_or_default();

            tx.exec(
                "INSERT INTO profiles (user_id, bio) VALUES (?, ?)",
                &[Value::from(user_id), Value::from("Software Developer")],
            )
            .await?;

            // Both operations commit together
            Ok(user_id)
        })
    })
    .await?;
    println!("   ✓ User and profile created with ID: {user_id}\n");

    // Example 3: doomed transaction rolls back
    println!("3. Testing rollback on error...");
    let result = with_transaction(&store, ExecContext::new(), |tx| {
        Box::pin(async move {
            tx.exec(
                "INSERT INTO users (name, email) VALUES (?, ?)",
                &[Value::from("Charlie"), Value::from("charlie@example.com")],
            )
            .await?;

            // This fails and dooms the transaction
            tx.query("SELECT * FROM non_existent_table", &[]).await?;
            Ok(())
        })
    })
    .await;

    match result {
        Ok(()) => println!("   ✗ Should have failed!"),
        Err(e) => println!("   ✓ Transaction rolled back: {e}\n"),
    }

    // Example 4: slow-query logging
    println!("4. Triggering the slow-query log (threshold 50ms)...");
    let mut tx = store.begin(ExecContext::new()).await?;
    tx.query("SELECT SLEEP(0.08)", &[]).await?;
    tx.close().await?;
    println!("   ✓ Check for a SLOW event above\n");

    println!("=== All examples completed successfully ===");

    store.close().await?;
    Ok(())
}
