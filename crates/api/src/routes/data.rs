use crate::{
    routes::{download::csv_attachment, ApiError},
    AggregateParams, AggregateRequest, AppState, DataParams, DataTable, SeriesRequest,
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/aws/data",
    params(DataParams),
    responses(
        (status = OK, description = "Decimated readings for the requested stations", body = DataTable),
        (status = BAD_REQUEST, description = "Unknown variable, station list, or date range"),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query the store")
    ))]
pub async fn query_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DataParams>,
) -> Result<Response, ApiError> {
    let req = SeriesRequest::try_from(params)?;
    let table = state.weather_db.series(&req).await?;
    Ok(respond(req.download, &req.start, &req.end, table))
}

#[utoipa::path(
    get,
    path = "/aws/aggregate",
    params(AggregateParams),
    responses(
        (status = OK, description = "Per-station extrema over the requested grouping", body = DataTable),
        (status = BAD_REQUEST, description = "Unknown variable, kind, grouping, or date range"),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query the store")
    ))]
pub async fn query_aggregate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AggregateParams>,
) -> Result<Response, ApiError> {
    let req = AggregateRequest::try_from(params)?;
    let table = state.weather_db.aggregate(&req).await?;
    Ok(respond(req.download, &req.start, &req.end, table))
}

fn respond(download: bool, start: &str, end: &str, table: DataTable) -> Response {
    if download {
        csv_attachment(start, end, &table).into_response()
    } else {
        Json(table).into_response()
    }
}
