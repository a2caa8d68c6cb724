/// Errors produced by the platform side of a history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The platform refused a history operation.
    #[error("history operation failed: {0}")]
    Platform(String),

    /// A URL handed to the platform could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
