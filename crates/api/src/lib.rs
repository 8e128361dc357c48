pub mod db;
mod requests;
pub mod routes;
mod startup;
mod utils;

pub use db::{open_store, DataTable, QueryError, WeatherAccess, WeatherData};
pub use requests::{
    AggKind, AggregateParams, AggregateRequest, DataParams, Grouping, RequestError,
    SeriesRequest, DOWNLOAD_ROW_CAP, PREVIEW_ROW_CAP,
};
pub use routes::ApiError;
pub use startup::{app, build_app_state, AppState};
pub use utils::{get_config_info, get_log_level, setup_logger, Cli};

/// Migrations shared with the daemon crate; the api can bring up a
/// fresh store before the first ingest run has happened.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
