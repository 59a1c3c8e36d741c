use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid location table: {0}")]
    InvalidTable(String),

    #[error("Report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GeoError>;
