use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollerError {
    #[error("Host {host_id} ({name}) has no usable address: {reason}")]
    InvalidAddress {
        host_id: u64,
        name: String,
        reason: String,
    },

    #[error("Game '{wanted}' not offered by registry, found: [{available}]")]
    GameNotFound { wanted: String, available: String },

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Signal handler error: {0}")]
    Signal(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PollerError>;
