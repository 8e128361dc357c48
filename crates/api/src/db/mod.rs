pub mod sqlite;
pub mod weather_data;

pub use sqlite::open_store;
pub use weather_data::{DataTable, QueryError, StationRow, WeatherAccess, WeatherData};
