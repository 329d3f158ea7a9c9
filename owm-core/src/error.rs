use thiserror::Error;

/// Errors produced by the weather client.
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("You must specify either a city or a place (coordinates)")]
    MissingLocation,

    #[error("Unknown temperature scale '{0}'. Supported scales: celsius, fahrenheit, kelvin.")]
    InvalidScale(String),

    #[error("OpenWeatherMap API key must not be empty")]
    EmptyApiKey,

    #[error("History interval must be a positive number of days, got {0}")]
    InvalidInterval(f64),

    #[error("History range ends before it starts")]
    InvalidTimeRange,

    #[error("Upstream request failed: {0}")]
    UpstreamRequestFailed(String),

    #[error("Failed to decode upstream response: {0}")]
    UpstreamDecodeFailed(String),

    #[error("Error parsing weather information: {0}")]
    MalformedWeatherData(String),

    #[error("Error parsing weather history: response has no 'list' array")]
    MalformedHistoryResponse,

    #[error("City lookup failed: {0}")]
    CityLookup(#[from] rusqlite::Error),

    #[error("No city matches '{0}'")]
    CityNotFound(String),

    #[error("'{name}' matches {matches} cities; narrow it down with a country code or use the city id")]
    AmbiguousCity { name: String, matches: usize },
}

impl WeatherError {
    /// Whether the failure came from talking to the remote API rather than
    /// from the caller's input or the payload contents.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamRequestFailed(_) | Self::UpstreamDecodeFailed(_))
    }
}

pub type Result<T, E = WeatherError> = std::result::Result<T, E>;
