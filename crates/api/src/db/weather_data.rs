use crate::{AggKind, AggregateRequest, Grouping, SeriesRequest};
use amrdc_core::{Variable, MISSING_SENTINEL, OBSERVATION_TABLE};
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use utoipa::ToSchema;

/// Keeps a reading when its HHMM value is a multiple of the requested
/// interval. Midnight is a multiple of everything, so every day's first
/// reading always survives decimation.
const DECIMATION_PREDICATE: &str =
    "(CAST(substr(time, 1, 2) AS INTEGER) * 100 + CAST(substr(time, 4, 2) AS INTEGER)) % ? = 0";

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("failed to query the store: {0}")]
    Store(#[from] sqlx::Error),
}

/// Tabular query result, one row of strings per reading. The shape is
/// shared by the JSON responses and the CSV downloads.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct DataTable {
    pub header: Vec<String>,
    pub data: Vec<Vec<String>>,
}

impl DataTable {
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&csv_row(&self.header));
        for row in &self.data {
            out.push_str(&csv_row(row));
        }
        out
    }
}

fn csv_row(fields: &[String]) -> String {
    let mut line = fields.iter().map(|field| csv_field(field)).join(",");
    line.push('\n');
    line
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

/// A row of the station directory kept up to date by the daemon.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StationRow {
    pub station_name: String,
    pub region: String,
    pub resource_url: String,
}

#[async_trait]
pub trait WeatherData: Sync + Send {
    /// Decimated point readings for the requested stations and range.
    async fn series(&self, req: &SeriesRequest) -> Result<DataTable, QueryError>;
    /// Per-station extrema over the requested grouping period.
    async fn aggregate(&self, req: &AggregateRequest) -> Result<DataTable, QueryError>;
    /// Names of every station with at least one reading.
    async fn station_names(&self) -> Result<Vec<String>, QueryError>;
    /// Years covered by at least one reading.
    async fn years(&self) -> Result<Vec<i64>, QueryError>;
    /// Years covered by the named stations.
    async fn years_for_stations(&self, stations: &[String]) -> Result<Vec<i64>, QueryError>;
    /// Stations with readings in the named years.
    async fn stations_for_years(&self, years: &[String]) -> Result<Vec<String>, QueryError>;
    /// The station directory discovered from the upstream catalog.
    async fn station_directory(&self) -> Result<Vec<StationRow>, QueryError>;
}

pub struct WeatherAccess {
    pool: SqlitePool,
}

impl WeatherAccess {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn placeholders(count: usize) -> String {
    std::iter::repeat("?").take(count).join(", ")
}

/// Leading `date` characters that identify the grouping period.
/// `Station` has no period: one extremum per station over the range.
fn period_expr(grouping: Grouping) -> Option<&'static str> {
    match grouping {
        Grouping::Station => None,
        Grouping::Year => Some("substr(date, 1, 4)"),
        Grouping::Month => Some("substr(date, 1, 7)"),
        Grouping::Day => Some("date"),
    }
}

fn order_direction(kind: AggKind) -> &'static str {
    match kind {
        AggKind::Max => "DESC",
        AggKind::Min => "ASC",
    }
}

fn channel_text(row: &SqliteRow, index: usize) -> Result<String, sqlx::Error> {
    Ok(row
        .try_get::<Option<f64>, _>(index)?
        .map(|value| value.to_string())
        .unwrap_or_default())
}

#[async_trait]
impl WeatherData for WeatherAccess {
    async fn series(&self, req: &SeriesRequest) -> Result<DataTable, QueryError> {
        let columns: Vec<&'static str> = match req.variable {
            Some(variable) => vec![variable.column()],
            None => Variable::ALL.iter().map(|v| v.column()).collect(),
        };

        let mut sql = format!(
            "SELECT station_name, date, time, {} FROM {} WHERE date >= ? AND date <= ?",
            columns.join(", "),
            OBSERVATION_TABLE,
        );
        if !req.all_stations() {
            sql.push_str(&format!(
                " AND station_name IN ({})",
                placeholders(req.stations.len())
            ));
        }
        sql.push_str(&format!(" AND {DECIMATION_PREDICATE}"));
        // Chronological order, so the row cap keeps the earliest
        // readings of a multi-station range rather than one station.
        sql.push_str(" ORDER BY date, time, station_name LIMIT ?");

        let mut query = sqlx::query(&sql).bind(&req.start).bind(&req.end);
        if !req.all_stations() {
            for station in &req.stations {
                query = query.bind(station);
            }
        }
        query = query.bind(req.interval).bind(req.row_cap);

        let rows = query.fetch_all(&self.pool).await?;
        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = vec![
                row.try_get::<String, _>(0)?,
                row.try_get::<String, _>(1)?,
                row.try_get::<String, _>(2)?,
            ];
            for index in 0..columns.len() {
                record.push(channel_text(&row, 3 + index)?);
            }
            data.push(record);
        }

        let mut header = vec![
            "station_name".to_owned(),
            "date".to_owned(),
            "time".to_owned(),
        ];
        header.extend(columns.iter().map(|col| (*col).to_owned()));

        Ok(DataTable { header, data })
    }

    async fn aggregate(&self, req: &AggregateRequest) -> Result<DataTable, QueryError> {
        let col = req.variable.column();
        let direction = order_direction(req.kind);
        let partition = match period_expr(req.grouping) {
            Some(expr) => format!("station_name, {expr}"),
            None => "station_name".to_owned(),
        };
        let station_filter = if req.all_stations() {
            String::new()
        } else {
            format!(
                " AND station_name IN ({})",
                placeholders(req.stations.len())
            )
        };

        // Ties on the value break toward the earliest reading, so
        // repeated queries always return the same row.
        let sql = format!(
            "SELECT station_name, date, time, {col} FROM ( \
                SELECT station_name, date, time, {col}, \
                    ROW_NUMBER() OVER ( \
                        PARTITION BY {partition} \
                        ORDER BY {col} {direction}, date ASC, time ASC \
                    ) AS row_num \
                FROM {OBSERVATION_TABLE} \
                WHERE date >= ? AND date <= ? \
                    AND {col} IS NOT NULL AND {col} != ?{station_filter} \
            ) WHERE row_num = 1 ORDER BY station_name, date",
        );

        let mut query = sqlx::query(&sql)
            .bind(&req.start)
            .bind(&req.end)
            .bind(MISSING_SENTINEL);
        if !req.all_stations() {
            for station in &req.stations {
                query = query.bind(station);
            }
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            data.push(vec![
                row.try_get::<String, _>(0)?,
                row.try_get::<String, _>(1)?,
                row.try_get::<String, _>(2)?,
                channel_text(&row, 3)?,
            ]);
        }

        Ok(DataTable {
            header: vec![
                "station_name".to_owned(),
                "date".to_owned(),
                "time".to_owned(),
                col.to_owned(),
            ],
            data,
        })
    }

    async fn station_names(&self) -> Result<Vec<String>, QueryError> {
        let names = sqlx::query_scalar(&format!(
            "SELECT DISTINCT station_name FROM {OBSERVATION_TABLE} ORDER BY station_name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn years(&self) -> Result<Vec<i64>, QueryError> {
        let years = sqlx::query_scalar(&format!(
            "SELECT DISTINCT CAST(substr(date, 1, 4) AS INTEGER) FROM {OBSERVATION_TABLE} ORDER BY 1"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(years)
    }

    async fn years_for_stations(&self, stations: &[String]) -> Result<Vec<i64>, QueryError> {
        let sql = format!(
            "SELECT DISTINCT CAST(substr(date, 1, 4) AS INTEGER) FROM {OBSERVATION_TABLE} \
             WHERE station_name IN ({}) ORDER BY 1",
            placeholders(stations.len())
        );
        let mut query = sqlx::query_scalar(&sql);
        for station in stations {
            query = query.bind(station);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn stations_for_years(&self, years: &[String]) -> Result<Vec<String>, QueryError> {
        let sql = format!(
            "SELECT DISTINCT station_name FROM {OBSERVATION_TABLE} \
             WHERE substr(date, 1, 4) IN ({}) ORDER BY station_name",
            placeholders(years.len())
        );
        let mut query = sqlx::query_scalar(&sql);
        for year in years {
            query = query.bind(year);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn station_directory(&self) -> Result<Vec<StationRow>, QueryError> {
        let rows = sqlx::query(
            "SELECT station_name, region, resource_url FROM stations ORDER BY region, station_name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stations = Vec::with_capacity(rows.len());
        for row in rows {
            stations.push(StationRow {
                station_name: row.try_get(0)?,
                region: row.try_get(1)?,
                resource_url: row.try_get(2)?,
            });
        }
        Ok(stations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_periods_are_date_prefixes() {
        assert_eq!(period_expr(Grouping::Station), None);
        assert_eq!(period_expr(Grouping::Year), Some("substr(date, 1, 4)"));
        assert_eq!(period_expr(Grouping::Month), Some("substr(date, 1, 7)"));
        assert_eq!(period_expr(Grouping::Day), Some("date"));
    }

    #[test]
    fn max_sorts_descending_and_min_ascending() {
        assert_eq!(order_direction(AggKind::Max), "DESC");
        assert_eq!(order_direction(AggKind::Min), "ASC");
    }

    #[test]
    fn csv_quotes_fields_with_commas() {
        let table = DataTable {
            header: vec!["station_name".to_owned(), "note".to_owned()],
            data: vec![vec!["Dome C, II".to_owned(), "say \"hi\"".to_owned()]],
        };
        assert_eq!(
            table.to_csv(),
            "station_name,note\n\"Dome C, II\",\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn placeholder_lists_match_the_bind_count() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
