use anyhow::{Context, Result};
use slog::{debug, warn, Logger};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{
    collections::HashSet, future::Future, path::Path, str::FromStr, sync::Arc, time::Duration,
};
use amrdc_core::create_dir_all;
use tokio::sync::{mpsc, oneshot};

use crate::{DiscoveredStation, ParsedRecord};

/// Migrations shared with the api crate; both services embed the same
/// migrator so either can bring up a fresh store.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Open the warehouse store, creating the file and schema if needed.
pub async fn open_store(db_path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(&parent.to_string_lossy())
                .with_context(|| format!("Failed to create database directory: {parent:?}"))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
        .create_if_missing(true)
        .pragma("journal_mode", "WAL")
        .pragma("synchronous", "NORMAL")
        .pragma("busy_timeout", "5000")
        .pragma("foreign_keys", "ON");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .context("Failed to create database connection pool")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

type WriteOperation = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

/// Funnels every store write through a single task, so concurrent
/// station pipelines never interleave writes for the same file.
pub struct StoreWriter {
    write_tx: mpsc::UnboundedSender<WriteOperation>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Default for StoreWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreWriter {
    pub fn new() -> Self {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteOperation>();

        let handle = tokio::spawn(async move {
            while let Some(future) = write_rx.recv().await {
                future.await;
            }
        });

        Self {
            write_tx,
            _handle: handle,
        }
    }

    pub async fn execute<T, F, Fut>(&self, pool: SqlitePool, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<Result<T>>();

        let write_op = Box::pin(async move {
            let result = operation(pool).await;
            let _ = result_tx.send(result);
        });

        self.write_tx
            .send(write_op)
            .map_err(|_| anyhow::anyhow!("Store writer channel closed"))?;

        result_rx
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive write result"))?
    }
}

/// Outcome of loading one file into the store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Accumulated per-record failures; never raised mid-batch.
    pub errors: Vec<String>,
}

pub struct Loader {
    logger: Logger,
    pool: SqlitePool,
    writer: Arc<StoreWriter>,
}

impl Loader {
    pub fn new(logger: Logger, pool: SqlitePool) -> Self {
        Self {
            logger,
            pool,
            writer: Arc::new(StoreWriter::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upsert the reference row for a discovered station.
    pub async fn upsert_station(&self, station: &DiscoveredStation) -> Result<()> {
        let pool = self.pool.clone();
        let station = station.clone();

        self.writer
            .execute(pool, move |pool| async move {
                sqlx::query(
                    "INSERT INTO stations (station_name, region, resource_url)
                     VALUES (?, ?, ?)
                     ON CONFLICT(station_name) DO UPDATE SET
                         region = excluded.region,
                         resource_url = excluded.resource_url",
                )
                .bind(&station.name)
                .bind(&station.region)
                .bind(&station.resource_url)
                .execute(&pool)
                .await?;
                Ok(())
            })
            .await
    }

    /// Load one file's parsed records for a station.
    ///
    /// Each record is upserted on `(station_name, date, time)`, so
    /// re-running the same file reproduces the same final state. A record
    /// that fails to apply is counted and skipped; its siblings commit.
    pub async fn load(&self, station: &str, records: Vec<ParsedRecord>) -> Result<LoadResult> {
        let pool = self.pool.clone();
        let station_name = station.to_owned();
        let station = station.to_owned();

        let result = self
            .writer
            .execute(pool, move |pool| async move {
                let mut result = LoadResult::default();

                // One round-trip to classify insert vs update for the batch.
                let existing: HashSet<(String, String)> =
                    sqlx::query_as("SELECT date, time FROM aws_10min WHERE station_name = ?")
                        .bind(&station)
                        .fetch_all(&pool)
                        .await?
                        .into_iter()
                        .collect();

                let mut tx = pool.begin().await?;
                for record in &records {
                    let applied = sqlx::query(
                        "INSERT INTO aws_10min (
                            station_name, date, time,
                            temperature, pressure, wind_speed,
                            wind_direction, humidity, delta_t
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                        ON CONFLICT(station_name, date, time) DO UPDATE SET
                            temperature = excluded.temperature,
                            pressure = excluded.pressure,
                            wind_speed = excluded.wind_speed,
                            wind_direction = excluded.wind_direction,
                            humidity = excluded.humidity,
                            delta_t = excluded.delta_t",
                    )
                    .bind(&station)
                    .bind(&record.date)
                    .bind(&record.time)
                    .bind(record.channels[0])
                    .bind(record.channels[1])
                    .bind(record.channels[2])
                    .bind(record.channels[3])
                    .bind(record.channels[4])
                    .bind(record.channels[5])
                    .execute(&mut *tx)
                    .await;

                    match applied {
                        Ok(_) => {
                            let key = (record.date.clone(), record.time.clone());
                            if existing.contains(&key) {
                                result.updated += 1;
                            } else {
                                result.inserted += 1;
                            }
                        }
                        Err(e) => {
                            result.skipped += 1;
                            result
                                .errors
                                .push(format!("{} {} {}: {}", station, record.date, record.time, e));
                        }
                    }
                }
                tx.commit().await?;

                Ok(result)
            })
            .await?;

        if result.skipped > 0 {
            warn!(
                self.logger,
                "skipped {} records while loading {}", result.skipped, station_name
            );
        }
        debug!(
            self.logger,
            "loaded {}: {} inserted, {} updated", station_name, result.inserted, result.updated
        );

        Ok(result)
    }
}
