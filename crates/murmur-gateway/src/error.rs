use thiserror::Error;

/// Why a single send was abandoned. None of these are reported to the client.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("failed to persist message: {0:#}")]
    Persist(anyhow::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
