use futures::{stream, StreamExt};
use slog::{debug, error, info, Logger};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    parse_line, CatalogClient, DiscoveredStation, Loader, ResourceFetcher, HEADER_LINES,
};

/// Summary of one ingestion run across all stations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub stations_ok: u64,
    pub stations_failed: u64,
    pub stations_cancelled: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub records_skipped: u64,
    pub lines_malformed: u64,
}

struct StationStats {
    inserted: u64,
    updated: u64,
    skipped: u64,
    malformed: u64,
}

pub struct IngestPipeline {
    logger: Logger,
    catalog: CatalogClient,
    fetcher: Arc<ResourceFetcher>,
    loader: Arc<Loader>,
    concurrency: usize,
}

impl IngestPipeline {
    pub fn new(
        logger: Logger,
        catalog: CatalogClient,
        fetcher: Arc<ResourceFetcher>,
        loader: Arc<Loader>,
        concurrency: usize,
    ) -> Self {
        Self {
            logger,
            catalog,
            fetcher,
            loader,
            concurrency: concurrency.max(1),
        }
    }

    /// One full ingestion run: discover stations, then run one
    /// fetch/parse/load pipeline per station with bounded concurrency.
    ///
    /// A station that fails is logged and counted; it never blocks the
    /// others, and its previously loaded data is untouched. Cancellation
    /// is honored at station boundaries only.
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<IngestReport> {
        let stations = self.catalog.discover_stations().await?;
        info!(self.logger, "catalog run found {} stations", stations.len());

        for station in &stations {
            self.loader.upsert_station(station).await?;
        }

        let mut report = IngestReport::default();
        let outcomes: Vec<Option<anyhow::Result<StationStats>>> = stream::iter(stations)
            .map(|station| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(self.ingest_station(&station).await)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                None => report.stations_cancelled += 1,
                Some(Ok(stats)) => {
                    report.stations_ok += 1;
                    report.rows_inserted += stats.inserted;
                    report.rows_updated += stats.updated;
                    report.records_skipped += stats.skipped;
                    report.lines_malformed += stats.malformed;
                }
                Some(Err(_)) => report.stations_failed += 1,
            }
        }

        info!(
            self.logger,
            "ingest run finished";
            "ok" => report.stations_ok,
            "failed" => report.stations_failed,
            "cancelled" => report.stations_cancelled,
            "inserted" => report.rows_inserted,
            "updated" => report.rows_updated,
            "malformed_lines" => report.lines_malformed,
        );
        Ok(report)
    }

    async fn ingest_station(&self, station: &DiscoveredStation) -> anyhow::Result<StationStats> {
        match self.fetch_parse_load(station).await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                error!(
                    self.logger,
                    "pipeline failed for {}: {}", station.name, e
                );
                Err(e)
            }
        }
    }

    async fn fetch_parse_load(&self, station: &DiscoveredStation) -> anyhow::Result<StationStats> {
        let lines = self.fetcher.fetch_lines(&station.resource_url).await?;

        let mut records = Vec::with_capacity(lines.len().saturating_sub(HEADER_LINES));
        let mut malformed = 0;
        for line in lines.iter().skip(HEADER_LINES) {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    malformed += 1;
                    debug!(
                        self.logger,
                        "malformed line in {}: {}", station.name, reason
                    );
                }
            }
        }

        let loaded = self.loader.load(&station.name, records).await?;
        Ok(StationStats {
            inserted: loaded.inserted,
            updated: loaded.updated,
            skipped: loaded.skipped,
            malformed,
        })
    }
}
