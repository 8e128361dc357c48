use api::{app, AppState, WeatherAccess, MIGRATOR};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_store() -> SqlitePool {
    // A single connection keeps the in-memory database alive and shared.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory store");
    MIGRATOR.run(&pool).await.expect("migrations");
    pool
}

fn test_app(pool: SqlitePool) -> Router {
    app(AppState {
        weather_db: Arc::new(WeatherAccess::new(pool)),
    })
}

async fn seed_reading(pool: &SqlitePool, station: &str, date: &str, time: &str, temperature: f64) {
    sqlx::query(
        "INSERT INTO aws_10min \
         (station_name, date, time, temperature, pressure, wind_speed, wind_direction, humidity, delta_t) \
         VALUES (?, ?, ?, ?, 985.2, 5.6, 270.0, 78.0, -1.2)",
    )
    .bind(station)
    .bind(date)
    .bind(time)
    .bind(temperature)
    .execute(pool)
    .await
    .expect("seed reading");
}

async fn get_response(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, bytes.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, bytes) = get_response(app, uri).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn rows(body: &Value) -> Vec<Vec<String>> {
    body["data"]
        .as_array()
        .expect("data rows")
        .iter()
        .map(|row| {
            row.as_array()
                .expect("row")
                .iter()
                .map(|field| field.as_str().expect("field").to_owned())
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn hourly_interval_keeps_only_on_the_hour_readings() {
    let pool = test_store().await;
    for time in ["00:00", "00:10", "01:00", "01:30", "02:00"] {
        seed_reading(&pool, "Byrd", "2019-02-01", time, -25.0).await;
    }
    let app = test_app(pool);

    let (status, body) = get_json(&app, "/aws/data?stations=Byrd&interval=100").await;
    assert_eq!(status, StatusCode::OK);

    let times: Vec<String> = rows(&body).iter().map(|row| row[2].clone()).collect();
    assert_eq!(times, vec!["00:00", "01:00", "02:00"]);
}

#[tokio::test]
async fn unit_interval_returns_every_reading() {
    let pool = test_store().await;
    for time in ["00:00", "00:10", "00:20"] {
        seed_reading(&pool, "Byrd", "2019-02-01", time, -25.0).await;
    }
    let app = test_app(pool);

    let (status, body) = get_json(&app, "/aws/data?stations=Byrd&interval=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows(&body).len(), 3);
}

#[tokio::test]
async fn series_selects_a_single_variable_column() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -25.3).await;
    let app = test_app(pool);

    let (status, body) = get_json(
        &app,
        "/aws/data?stations=Byrd&interval=1&variable=temperature",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["header"],
        serde_json::json!(["station_name", "date", "time", "temperature"])
    );
    assert_eq!(rows(&body)[0][3], "-25.3");
}

#[tokio::test]
async fn missing_sentinel_never_wins_an_extremum() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -20.0).await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:10", -10.0).await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:20", 444.0).await;
    let app = test_app(pool);

    let (status, body) = get_json(
        &app,
        "/aws/aggregate?stations=Byrd&variable=temperature&kind=max",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = rows(&body);
    assert_eq!(data.len(), 1);
    assert_eq!(data[0], vec!["Byrd", "2019-02-01", "00:10", "-10"]);
}

#[tokio::test]
async fn tied_extrema_break_toward_the_earliest_reading() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-01-02", "00:00", -10.0).await;
    seed_reading(&pool, "Byrd", "2019-01-01", "00:10", -10.0).await;
    seed_reading(&pool, "Byrd", "2019-01-01", "00:00", -30.0).await;
    let app = test_app(pool);

    for _ in 0..3 {
        let (status, body) = get_json(
            &app,
            "/aws/aggregate?stations=Byrd&variable=temperature&kind=max",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows(&body), vec![vec!["Byrd", "2019-01-01", "00:10", "-10"]]);
    }
}

#[tokio::test]
async fn month_grouping_splits_on_calendar_boundaries() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-01-31", "23:50", -15.0).await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -20.0).await;
    let app = test_app(pool);

    let (status, body) = get_json(
        &app,
        "/aws/aggregate?stations=Byrd&variable=temperature&kind=max&grouping=month",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        rows(&body),
        vec![
            vec!["Byrd", "2019-01-31", "23:50", "-15"],
            vec!["Byrd", "2019-02-01", "00:00", "-20"],
        ]
    );
}

#[tokio::test]
async fn minimum_sorts_ascending() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -20.0).await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:10", -35.5).await;
    let app = test_app(pool);

    let (status, body) = get_json(
        &app,
        "/aws/aggregate?stations=Byrd&variable=temperature&kind=min",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        rows(&body),
        vec![vec!["Byrd", "2019-02-01", "00:10", "-35.5"]]
    );
}

#[tokio::test]
async fn all_stations_drops_the_station_filter() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -20.0).await;
    seed_reading(&pool, "Gill", "2019-02-01", "00:00", -30.0).await;
    let app = test_app(pool);

    let (status, body) = get_json(&app, "/aws/data?stations=all&interval=1").await;
    assert_eq!(status, StatusCode::OK);
    let stations: Vec<String> = rows(&body).iter().map(|row| row[0].clone()).collect();
    assert_eq!(stations, vec!["Byrd", "Gill"]);
}

#[tokio::test]
async fn series_orders_chronologically_across_stations() {
    let pool = test_store().await;
    seed_reading(&pool, "Zulu", "2019-01-01", "00:00", -20.0).await;
    seed_reading(&pool, "Alpha", "2019-06-01", "00:00", -30.0).await;
    let app = test_app(pool);

    let (status, body) = get_json(&app, "/aws/data?stations=all&interval=1").await;
    assert_eq!(status, StatusCode::OK);
    let dates: Vec<String> = rows(&body).iter().map(|row| row[1].clone()).collect();
    assert_eq!(dates, vec!["2019-01-01", "2019-06-01"]);
}

#[tokio::test]
async fn unknown_variable_is_rejected_on_both_endpoints() {
    let pool = test_store().await;
    let app = test_app(pool);

    let (status, body) = get_json(&app, "/aws/data?stations=Byrd&variable=humidity2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("humidity2"));

    let (status, _) = get_json(
        &app,
        "/aws/aggregate?stations=Byrd&variable=humidity2&kind=max",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_date_range_is_ok_and_empty() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -20.0).await;
    let app = test_app(pool);

    let (status, body) = get_json(
        &app,
        "/aws/data?stations=Byrd&interval=1&startdate=20200101&enddate=20201231",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(rows(&body).is_empty());
}

#[tokio::test]
async fn listings_cover_stations_and_years() {
    let pool = test_store().await;
    seed_reading(&pool, "Gill", "2018-06-01", "00:00", -40.0).await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -20.0).await;
    let app = test_app(pool);

    let (status, body) = get_json(&app, "/aws/list").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({"stations": ["Byrd", "Gill"], "years": [2018, 2019]})
    );

    let (status, body) = get_json(&app, "/aws/list/stations/Byrd").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"years": [2019]}));

    let (status, body) = get_json(&app, "/aws/list/years/2018").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"stations": ["Gill"]}));
}

#[tokio::test]
async fn station_directory_serves_catalog_rows() {
    let pool = test_store().await;
    sqlx::query(
        "INSERT INTO stations (station_name, region, resource_url) VALUES (?, ?, ?)",
    )
    .bind("Byrd")
    .bind("West Antarctica")
    .bind("https://example.org/byrd_10min.txt")
    .execute(&pool)
    .await
    .expect("seed station");
    let app = test_app(pool);

    let (status, body) = get_json(&app, "/stations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["station_name"], "Byrd");
    assert_eq!(body[0]["region"], "West Antarctica");
}

#[tokio::test]
async fn download_serves_csv_with_the_citation_first() {
    let pool = test_store().await;
    seed_reading(&pool, "Byrd", "2019-02-01", "00:00", -20.0).await;
    let app = test_app(pool);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/aws/data?stations=Byrd&interval=1&download=true")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().expect("header"),
        "text/csv"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = String::from_utf8(bytes.to_vec()).expect("utf8");
    let mut lines = body.lines();
    assert!(lines.next().expect("citation").starts_with("Antarctic"));
    assert!(lines
        .next()
        .expect("header")
        .starts_with("station_name,date,time"));
    assert!(lines.next().expect("row").starts_with("Byrd,2019-02-01"));
}
