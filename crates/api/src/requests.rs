//! Normalizes raw query parameters into validated request values.
//!
//! Everything caller-controlled is checked here, before any SQL is
//! built: variables against the fixed allow-list, dates against the
//! calendar, aggregation kinds and groupings against their enums.

use amrdc_core::Variable;
use serde::Deserialize;
use time::{macros::format_description, Date};
use utoipa::IntoParams;

/// Row cap for preview responses.
pub const PREVIEW_ROW_CAP: i64 = 10_000;
/// Row cap when the caller requested a download.
pub const DOWNLOAD_ROW_CAP: i64 = 100_000;

/// Date range defaults meaning "any time period".
pub const DEFAULT_START_DATE: &str = "1900-01-01";
pub const DEFAULT_END_DATE: &str = "2099-12-31";

/// Default decimation interval: keep only the 00:00 slot of each day.
pub const DEFAULT_INTERVAL: u32 = 2400;

const DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    format_description!("[year][month][day]");

#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    InvalidVariable(#[from] amrdc_core::InvalidVariable),
    #[error("invalid date '{0}', expected YYYYMMDD")]
    InvalidDateRange(String),
    #[error("unknown aggregation kind '{0}', expected 'max' or 'min'")]
    InvalidAggKind(String),
    #[error("unknown grouping '{0}', expected 'year', 'month', 'day' or 'station'")]
    InvalidGrouping(String),
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Max,
    Min,
}

impl AggKind {
    fn parse(raw: &str) -> Result<Self, RequestError> {
        match raw {
            "max" => Ok(AggKind::Max),
            "min" => Ok(AggKind::Min),
            other => Err(RequestError::InvalidAggKind(other.to_owned())),
        }
    }
}

/// The period an extremum is computed over, per station.
/// `Station` means one extremum for the whole requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Station,
    Year,
    Month,
    Day,
}

impl Grouping {
    fn parse(raw: Option<&str>) -> Result<Self, RequestError> {
        match raw {
            None | Some("station") => Ok(Grouping::Station),
            Some("year") => Ok(Grouping::Year),
            Some("month") => Ok(Grouping::Month),
            Some("day") => Ok(Grouping::Day),
            Some(other) => Err(RequestError::InvalidGrouping(other.to_owned())),
        }
    }
}

/// Raw query parameters of `GET /aws/data`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct DataParams {
    /// Comma-separated station names, or `all`
    pub stations: Option<String>,
    /// Decimation interval in minutes
    pub interval: Option<u32>,
    /// Inclusive start date, `YYYYMMDD` or `YYYY`
    pub startdate: Option<String>,
    /// Inclusive end date, `YYYYMMDD` or `YYYY`
    pub enddate: Option<String>,
    /// Restrict the response to one sensor channel
    pub variable: Option<String>,
    /// Serve the result as a CSV attachment with the larger row cap
    pub download: Option<bool>,
}

/// Raw query parameters of `GET /aws/aggregate`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AggregateParams {
    /// Comma-separated station names, or `all`
    pub stations: Option<String>,
    /// Inclusive start date, `YYYYMMDD` or `YYYY`
    pub startdate: Option<String>,
    /// Inclusive end date, `YYYYMMDD` or `YYYY`
    pub enddate: Option<String>,
    /// The sensor channel to aggregate (required)
    pub variable: Option<String>,
    /// Extremum period: `year`, `month`, `day` or `station`
    pub grouping: Option<String>,
    /// `max` or `min` (required)
    pub kind: Option<String>,
    /// Serve the result as a CSV attachment
    pub download: Option<bool>,
}

/// Validated point-series request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub stations: Vec<String>,
    pub start: String,
    pub end: String,
    pub variable: Option<Variable>,
    pub interval: u32,
    pub download: bool,
    pub row_cap: i64,
}

impl SeriesRequest {
    /// True when the caller asked for every station.
    pub fn all_stations(&self) -> bool {
        self.stations.iter().any(|s| s == "all")
    }
}

impl TryFrom<DataParams> for SeriesRequest {
    type Error = RequestError;

    fn try_from(params: DataParams) -> Result<Self, Self::Error> {
        let stations = parse_stations(params.stations.as_deref())?;
        let (start, end) = parse_date_range(params.startdate.as_deref(), params.enddate.as_deref())?;
        let variable = match params.variable.as_deref() {
            Some(raw) if !raw.is_empty() => Some(raw.parse::<Variable>()?),
            _ => None,
        };
        let download = params.download.unwrap_or(false);

        Ok(SeriesRequest {
            stations,
            start,
            end,
            variable,
            // An interval of zero would divide by zero in the decimation
            // predicate; treat it as "keep everything".
            interval: params.interval.unwrap_or(DEFAULT_INTERVAL).max(1),
            download,
            row_cap: row_cap(download),
        })
    }
}

/// Validated extremum-aggregation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRequest {
    pub stations: Vec<String>,
    pub start: String,
    pub end: String,
    pub variable: Variable,
    pub grouping: Grouping,
    pub kind: AggKind,
    pub download: bool,
}

impl AggregateRequest {
    pub fn all_stations(&self) -> bool {
        self.stations.iter().any(|s| s == "all")
    }
}

impl TryFrom<AggregateParams> for AggregateRequest {
    type Error = RequestError;

    fn try_from(params: AggregateParams) -> Result<Self, Self::Error> {
        let stations = parse_stations(params.stations.as_deref())?;
        let (start, end) = parse_date_range(params.startdate.as_deref(), params.enddate.as_deref())?;
        let variable = params
            .variable
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .ok_or(RequestError::MissingParameter("variable"))?
            .parse::<Variable>()?;
        let kind = AggKind::parse(
            params
                .kind
                .as_deref()
                .ok_or(RequestError::MissingParameter("kind"))?,
        )?;
        let grouping = Grouping::parse(params.grouping.as_deref())?;

        Ok(AggregateRequest {
            stations,
            start,
            end,
            variable,
            grouping,
            kind,
            download: params.download.unwrap_or(false),
        })
    }
}

fn row_cap(download: bool) -> i64 {
    if download {
        DOWNLOAD_ROW_CAP
    } else {
        PREVIEW_ROW_CAP
    }
}

fn parse_stations(raw: Option<&str>) -> Result<Vec<String>, RequestError> {
    let raw = raw.ok_or(RequestError::MissingParameter("stations"))?;
    // The framework has already percent-decoded the query string.
    let stations: Vec<String> = raw
        .split(',')
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect();
    if stations.is_empty() {
        return Err(RequestError::MissingParameter("stations"));
    }
    Ok(stations)
}

fn parse_date_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(String, String), RequestError> {
    let start = match start {
        Some(raw) if !raw.is_empty() => parse_date(raw)?,
        _ => DEFAULT_START_DATE.to_owned(),
    };
    let end = match end {
        Some(raw) if !raw.is_empty() => parse_date(raw)?,
        _ => DEFAULT_END_DATE.to_owned(),
    };
    Ok((start, end))
}

/// Accepts `YYYYMMDD`, `YYYY-MM-DD`, or a bare `YYYY` (taken as Jan 1),
/// and normalizes to the store's `YYYY-MM-DD` text form.
fn parse_date(raw: &str) -> Result<String, RequestError> {
    let digits: String = raw.chars().filter(|c| *c != '-').collect();
    let digits = if digits.len() == 4 {
        format!("{digits}0101")
    } else {
        digits
    };

    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RequestError::InvalidDateRange(raw.to_owned()));
    }
    let date = Date::parse(&digits, DATE_FORMAT)
        .map_err(|_| RequestError::InvalidDateRange(raw.to_owned()))?;

    Ok(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month() as u8,
        date.day()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_defaults_cover_any_time_period() {
        let req = SeriesRequest::try_from(DataParams {
            stations: Some("Byrd,Gill".to_owned()),
            ..Default::default()
        })
        .expect("valid");
        assert_eq!(req.stations, vec!["Byrd", "Gill"]);
        assert_eq!(req.start, DEFAULT_START_DATE);
        assert_eq!(req.end, DEFAULT_END_DATE);
        assert_eq!(req.interval, DEFAULT_INTERVAL);
        assert_eq!(req.variable, None);
        assert_eq!(req.row_cap, PREVIEW_ROW_CAP);
    }

    #[test]
    fn download_raises_the_row_cap() {
        let req = SeriesRequest::try_from(DataParams {
            stations: Some("Byrd".to_owned()),
            download: Some(true),
            ..Default::default()
        })
        .expect("valid");
        assert_eq!(req.row_cap, DOWNLOAD_ROW_CAP);
    }

    #[test]
    fn accepts_dashed_compact_and_year_only_dates() {
        assert_eq!(parse_date("20190201").expect("compact"), "2019-02-01");
        assert_eq!(parse_date("2019-02-01").expect("dashed"), "2019-02-01");
        assert_eq!(parse_date("2019").expect("year"), "2019-01-01");
    }

    #[test]
    fn rejects_unparseable_dates() {
        assert!(matches!(
            parse_date("20191301"),
            Err(RequestError::InvalidDateRange(_))
        ));
        assert!(matches!(
            parse_date("soon"),
            Err(RequestError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn series_rejects_unknown_variable() {
        let err = SeriesRequest::try_from(DataParams {
            stations: Some("Byrd".to_owned()),
            variable: Some("humidity2".to_owned()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RequestError::InvalidVariable(_)));
    }

    #[test]
    fn series_requires_stations() {
        let err = SeriesRequest::try_from(DataParams::default()).unwrap_err();
        assert!(matches!(err, RequestError::MissingParameter("stations")));

        let err = SeriesRequest::try_from(DataParams {
            stations: Some(" , ".to_owned()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RequestError::MissingParameter("stations")));
    }

    #[test]
    fn aggregate_requires_variable_and_kind() {
        let err = AggregateRequest::try_from(AggregateParams {
            stations: Some("Byrd".to_owned()),
            kind: Some("max".to_owned()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RequestError::MissingParameter("variable")));

        let err = AggregateRequest::try_from(AggregateParams {
            stations: Some("Byrd".to_owned()),
            variable: Some("temperature".to_owned()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RequestError::MissingParameter("kind")));
    }

    #[test]
    fn aggregate_rejects_unknown_kind_and_grouping() {
        let err = AggregateRequest::try_from(AggregateParams {
            stations: Some("Byrd".to_owned()),
            variable: Some("temperature".to_owned()),
            kind: Some("median".to_owned()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RequestError::InvalidAggKind(_)));

        let err = AggregateRequest::try_from(AggregateParams {
            stations: Some("Byrd".to_owned()),
            variable: Some("temperature".to_owned()),
            kind: Some("max".to_owned()),
            grouping: Some("fortnight".to_owned()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RequestError::InvalidGrouping(_)));
    }

    #[test]
    fn grouping_defaults_to_whole_range_per_station() {
        let req = AggregateRequest::try_from(AggregateParams {
            stations: Some("Byrd".to_owned()),
            variable: Some("temperature".to_owned()),
            kind: Some("min".to_owned()),
            ..Default::default()
        })
        .expect("valid");
        assert_eq!(req.grouping, Grouping::Station);
    }

    #[test]
    fn station_names_with_spaces_split_only_on_commas() {
        let stations = parse_stations(Some("Siple Dome, Relay Station")).expect("valid");
        assert_eq!(stations, vec!["Siple Dome", "Relay Station"]);
    }

    #[test]
    fn station_names_are_taken_verbatim_after_decoding() {
        // A literal percent sequence in a name must survive untouched.
        let stations = parse_stations(Some("Odd%20Name")).expect("valid");
        assert_eq!(stations, vec!["Odd%20Name"]);
    }
}
