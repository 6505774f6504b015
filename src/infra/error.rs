use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string())
    }
}
