use http::StatusCode;

/// 发现客户端错误类型
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid registry url: {0}")]
    InvalidUrl(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Couldn't register to discovery service: {0}")]
    RegistrationFailed(String),
    #[error("Illegal lease state: {0}")]
    IllegalState(String),
    #[error("Unexpected response status {status} for {operation}")]
    UnexpectedStatus {
        operation: &'static str,
        status: StatusCode,
    },
}

impl DiscoveryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscoveryError::NotFound(_))
    }
}
