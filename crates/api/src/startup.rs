use crate::{
    db::{self, DataTable, StationRow, WeatherAccess},
    routes::{
        self, get_stations, list_stations_and_years, list_stations_for_years,
        list_years_for_stations, query_aggregate, query_data, StationsAndYears, StationsList,
        YearsList,
    },
    WeatherData,
};
use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::IntoResponse,
    routing::get,
    Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::info;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

#[derive(Clone)]
pub struct AppState {
    pub weather_db: Arc<dyn WeatherData>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::data::query_data,
        routes::data::query_aggregate,
        routes::stations::list_stations_and_years,
        routes::stations::list_years_for_stations,
        routes::stations::list_stations_for_years,
        routes::stations::get_stations,
    ),
    components(
        schemas(
            DataTable,
            StationRow,
            StationsAndYears,
            YearsList,
            StationsList
        )
    ),
    tags(
        (name = "amrdc data warehouse api", description = "a RESTful api serving quality-controlled Antarctic automatic weather station observations")
    )
)]
struct ApiDoc;

pub async fn build_app_state(db_path: &str) -> Result<AppState, anyhow::Error> {
    let pool = db::open_store(db_path).await?;
    Ok(AppState {
        weather_db: Arc::new(WeatherAccess::new(pool)),
    })
}

pub fn app(app_state: AppState) -> Router {
    let api_docs = ApiDoc::openapi();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/aws/list", get(list_stations_and_years))
        .route("/aws/list/stations/{stations}", get(list_years_for_stations))
        .route("/aws/list/years/{years}", get(list_stations_for_years))
        .route("/aws/data", get(query_data))
        .route("/aws/aggregate", get(query_aggregate))
        .route("/stations", get(get_stations))
        .with_state(Arc::new(app_state))
        .layer(middleware::from_fn(log_request))
        .merge(Scalar::with_url("/docs", api_docs))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}
