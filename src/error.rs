//! Error taxonomy shared by the bus, the emergence engine, and the field cache.
//!
//! Only [`Error::UnknownRecipient`] and [`Error::ValidationFailure`] ever reach a caller.
//! [`Error::StorageUnavailable`] is produced by collaborators and is logged and absorbed
//! at the point of the write or read; the in-memory path stays authoritative.

/// Errors raised by the coordination layer and its storage collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `send` addressed an agent that has no mailbox.
    #[error("unknown recipient agent: {0}")]
    UnknownRecipient(String),

    /// The durable store or the secondary cache tier could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] anyhow::Error),

    /// Malformed criteria passed to a query operation.
    #[error("validation failed: {0}")]
    ValidationFailure(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::StorageUnavailable(err.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::StorageUnavailable(anyhow::anyhow!("storage task failed: {err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_recipient_names_the_agent() {
        let err = Error::UnknownRecipient("GhostAgent".into());
        assert_eq!(err.to_string(), "unknown recipient agent: GhostAgent");
    }

    #[test]
    fn sqlite_errors_become_storage_unavailable() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }
}
