/// Core error type for the deletion monitor.
///
/// Adapter crates map their transport errors into this type so the monitor
/// loop can tell retryable failures apart from records it should just drop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Network/API failure while talking to the audit log (retryable).
    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("missing collaborator: {0}")]
    MissingCollaborator(String),

    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Whether the supervisor should retry the failed step.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
