use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("Remote event search failed: {message}")]
    RemoteFetch { message: String },

    #[error("Malformed event record: {0}")]
    MalformedRecord(String),

    #[error("Failed to write event {id}: {message}")]
    StoreWrite { id: String, message: String },

    #[error("Event query failed: {message}")]
    StoreQuery { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for EventsError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        EventsError::RemoteFetch { message }
    }
}

impl From<rusqlite::Error> for EventsError {
    fn from(err: rusqlite::Error) -> Self {
        EventsError::Database {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EventsError>;
