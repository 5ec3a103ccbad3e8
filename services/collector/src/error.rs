use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    /// Credential exchange or identity lookup failed; the connect attempt
    /// is aborted as a whole.
    #[error("feed connectivity: {0}")]
    Connectivity(#[from] reqwest::Error),

    #[error("credential response missing field `{0}`")]
    MalformedCredentials(&'static str),

    #[error(transparent)]
    Bus(#[from] tickflow_bus::BusError),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
