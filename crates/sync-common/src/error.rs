/// Error types shared by the Canvas and Notion clients.
///
/// These represent transport and upstream failures. The service crate decides which of them
/// are fatal for a run and which are recorded and skipped.
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Upstream { status, .. } | ClientError::UpstreamBody { status, .. } => {
                Some(*status)
            }
            ClientError::Request(e) => e.status(),
            ClientError::InvalidJson(_) => None,
        }
    }

    /// Credentials were rejected (401) or lack access (403).
    pub fn is_auth(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN)
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}
