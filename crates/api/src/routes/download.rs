use crate::db::DataTable;
use axum::http::HeaderValue;
use hyper::{
    header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    HeaderMap,
};
use time::OffsetDateTime;

const REPOSITORY_DOI: &str = "https://doi.org/10.48567/1hn2-nw60";

/// Renders a query result as a CSV attachment. The first line is the
/// repository citation covering the requested subset.
pub fn csv_attachment(start: &str, end: &str, table: &DataTable) -> (HeaderMap, String) {
    let accessed = OffsetDateTime::now_utc().date();
    let mut body = create_citation(start, end, &accessed.to_string());
    body.push('\n');
    body.push_str(&table.to_csv());

    let filename = format!("AMRDC Data Warehouse {}.csv", accessed);
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    (headers, body)
}

fn create_citation(start: &str, end: &str, accessed: &str) -> String {
    format!(
        "Antarctic Meteorological Research and Data Center: Automatic Weather Station \
         quality-controlled observational data. AMRDC Data Repository. Subset used: \
         {} - {}, accessed {}, {}.",
        month_of(start),
        month_of(end),
        accessed,
        REPOSITORY_DOI,
    )
}

/// `YYYY-MM` prefix of a `YYYY-MM-DD` date.
fn month_of(date: &str) -> &str {
    date.get(..7).unwrap_or(date)
}
