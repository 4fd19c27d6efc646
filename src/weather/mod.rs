pub mod aggregate;
pub mod models;
pub mod remote;
pub mod resolver;
pub mod state;

pub use aggregate::daily_aggregate;
pub use models::{
    Coordinates, CurrentConditions, FavoritePlace, ForecastSeries, HomeSnapshot, UnitSystem,
    WeatherQuery, COORDINATE_TOLERANCE,
};
pub use remote::{OpenWeatherClient, RemoteWeatherSource};
pub use resolver::WeatherResolver;
pub use state::{DataOrigin, NoDataReason, Resolved, WeatherState};
