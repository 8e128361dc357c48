use crate::MIGRATOR;
use amrdc_core::create_dir_all;
use anyhow::Context;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::{path::Path, str::FromStr};

/// Opens the warehouse store the daemon writes into.
///
/// Runs the shared migrations so the api can come up against an empty
/// path before the first ingest has happened.
pub async fn open_store(db_path: &str) -> Result<SqlitePool, anyhow::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(&parent.to_string_lossy())
                .with_context(|| format!("failed to create store directory {:?}", parent))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))
        .with_context(|| format!("invalid store path {}", db_path))?
        .create_if_missing(true)
        .pragma("journal_mode", "WAL")
        .pragma("synchronous", "NORMAL")
        .pragma("busy_timeout", "5000")
        .pragma("foreign_keys", "ON");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open the warehouse store")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("failed to run store migrations")?;

    Ok(pool)
}
