use crate::{db::StationRow, routes::ApiError, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Everything a client needs to build a query form in one request.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StationsAndYears {
    pub stations: Vec<String>,
    pub years: Vec<i64>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct YearsList {
    pub years: Vec<i64>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StationsList {
    pub stations: Vec<String>,
}

// Path segments arrive percent-decoded; only the comma list is ours.
fn split_path_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect()
}

#[utoipa::path(
    get,
    path = "/aws/list",
    responses(
        (status = OK, description = "Every station with readings and every covered year", body = StationsAndYears),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query the store")
    ))]
pub async fn list_stations_and_years(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StationsAndYears>, ApiError> {
    Ok(Json(StationsAndYears {
        stations: state.weather_db.station_names().await?,
        years: state.weather_db.years().await?,
    }))
}

#[utoipa::path(
    get,
    path = "/aws/list/stations/{stations}",
    params(
        ("stations" = String, Path, description = "Comma-separated station names"),
    ),
    responses(
        (status = OK, description = "Years covered by the named stations", body = YearsList),
        (status = BAD_REQUEST, description = "Empty station list"),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query the store")
    ))]
pub async fn list_years_for_stations(
    State(state): State<Arc<AppState>>,
    Path(stations): Path<String>,
) -> Result<Json<YearsList>, ApiError> {
    let stations = split_path_list(&stations);
    if stations.is_empty() {
        return Err(ApiError::BadRequest(
            "missing required parameter: stations".to_owned(),
        ));
    }
    Ok(Json(YearsList {
        years: state.weather_db.years_for_stations(&stations).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/aws/list/years/{years}",
    params(
        ("years" = String, Path, description = "Comma-separated years, YYYY"),
    ),
    responses(
        (status = OK, description = "Stations with readings in the named years", body = StationsList),
        (status = BAD_REQUEST, description = "Empty year list"),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query the store")
    ))]
pub async fn list_stations_for_years(
    State(state): State<Arc<AppState>>,
    Path(years): Path<String>,
) -> Result<Json<StationsList>, ApiError> {
    let years = split_path_list(&years);
    if years.is_empty() {
        return Err(ApiError::BadRequest(
            "missing required parameter: years".to_owned(),
        ));
    }
    Ok(Json(StationsList {
        stations: state.weather_db.stations_for_years(&years).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/stations",
    responses(
        (status = OK, description = "The station directory discovered from the upstream catalog", body = Vec<StationRow>),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query the store")
    ))]
pub async fn get_stations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StationRow>>, ApiError> {
    Ok(Json(state.weather_db.station_directory().await?))
}
