use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Transport(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected value for {path}: {value}")]
    UnexpectedValue {
        path: String,
        value: serde_json::Value,
    },
    #[error("event stream closed")]
    Closed,
}

impl ClientError {
    pub fn unexpected(path: &str, value: serde_json::Value) -> Self {
        Self::UnexpectedValue {
            path: path.to_string(),
            value,
        }
    }
}
