use serde::Deserialize;
use slog::{debug, Logger};
use std::time::Duration;

/// CKAN search filter selecting the quality-controlled AWS datasets.
const SEARCH_QUERY: &str = "title:\"quality-controlled+observational+data\"";
/// Suffix every AWS dataset title carries after the station name.
const TITLE_SUFFIX: &str = " Automatic Weather Station,";
/// Marker identifying the 10-minute resource within a dataset.
const TEN_MINUTE_MARKER: &str = "10min";
/// The Tall Tower site publishes a different field layout and is
/// excluded from ingestion, as in the upstream warehouse.
const EXCLUDED_SITE: &str = "Alexander Tall Tower";

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("catalog unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("catalog returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not decode catalog response: {0}")]
    Format(#[from] serde_json::Error),
}

/// A station discovered in the catalog: its name, the free-text region
/// grouping the catalog assigns it, and the URL of its 10-minute file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredStation {
    pub name: String,
    pub region: String,
    pub resource_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Deserialize)]
struct SearchResult {
    results: Vec<Dataset>,
}

#[derive(Deserialize)]
struct Dataset {
    title: String,
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    groups: Vec<Group>,
}

#[derive(Deserialize)]
struct Resource {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct Group {
    #[serde(default)]
    title: String,
}

pub struct CatalogClient {
    logger: Logger,
    client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(logger: Logger, base_url: String, user_agent: String) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            logger,
            client,
            base_url,
        })
    }

    /// Query the catalog once and return every station that publishes a
    /// 10-minute observation resource. Datasets without one are skipped,
    /// not errors.
    pub async fn discover_stations(&self) -> Result<Vec<DiscoveredStation>, CatalogError> {
        let url = format!(
            "{}/api/action/package_search?q={}&rows=1000",
            self.base_url, SEARCH_QUERY
        );
        debug!(self.logger, "searching catalog: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }
        let body = response.text().await?;

        let stations = decode_search_results(&body)?;
        debug!(self.logger, "discovered {} stations", stations.len());
        Ok(stations)
    }
}

/// Decode a CKAN `package_search` body into the station list.
fn decode_search_results(body: &str) -> Result<Vec<DiscoveredStation>, CatalogError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response
        .result
        .results
        .iter()
        .filter(|dataset| !dataset.title.contains(EXCLUDED_SITE))
        .filter_map(extract_station)
        .collect())
}

/// Derive the station from one dataset: strip the title suffix for the
/// name, then keep exactly the resource carrying the 10-minute marker.
fn extract_station(dataset: &Dataset) -> Option<DiscoveredStation> {
    let (name, _) = dataset.title.split_once(TITLE_SUFFIX)?;
    let resource = dataset
        .resources
        .iter()
        .find(|resource| resource.name.contains(TEN_MINUTE_MARKER))?;
    let region = dataset
        .groups
        .first()
        .map(|group| group.title.clone())
        .unwrap_or_default();

    Some(DiscoveredStation {
        name: name.to_owned(),
        region,
        resource_url: resource.url.clone(),
    })
}
