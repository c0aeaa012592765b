use thiserror::Error;

use crate::types::Hash;

pub type ChainVaultResult<T> = Result<T, ChainVaultError>;

#[derive(Debug, Error)]
pub enum ChainVaultError {
    /// The record is absent from the reachable part of the channel.
    #[error("record {hash} not found in channel {channel}")]
    NotFound { channel: String, hash: String },

    /// The record exists but carries no access entry (or capability) for the reader.
    #[error("reader {reader} is not authorized for record {record}")]
    NotAuthorized { record: Hash, reader: String },

    #[error("key unwrap failed: {0}")]
    KeyUnwrap(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("admission of {kind} record failed after {attempts} attempts: {last}")]
    Admission {
        kind: String,
        attempts: u32,
        last: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    /// A share capability does not line up with the meta record it points at.
    #[error("share carries {actual} chunk keys but meta references {expected} chunks")]
    ShareMismatch { expected: usize, actual: usize },

    /// A share names a preview other than the one its meta record references.
    #[error("share preview does not match the meta's preview")]
    SharePreviewMismatch,

    #[error("expected a {expected} record, found {actual}")]
    UnexpectedKind { expected: String, actual: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChainVaultError {
    pub fn not_found(channel: &str, hash: impl ToString) -> Self {
        ChainVaultError::NotFound {
            channel: channel.to_string(),
            hash: hash.to_string(),
        }
    }

    /// Whether retrying the whole operation later can change the outcome.
    ///
    /// Cryptographic and authorization failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainVaultError::NotFound { .. } | ChainVaultError::Transport(_)
        )
    }
}

impl From<serde_json::Error> for ChainVaultError {
    fn from(e: serde_json::Error) -> Self {
        ChainVaultError::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ChainVaultError::not_found("files/a", "abc").is_retryable());
        assert!(ChainVaultError::Transport("down".into()).is_retryable());
        assert!(!ChainVaultError::KeyUnwrap("bad".into()).is_retryable());
        assert!(!ChainVaultError::Decryption("tag".into()).is_retryable());
        assert!(!ChainVaultError::NotAuthorized {
            record: Hash::of(b"r"),
            reader: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn admission_message_mentions_attempts() {
        let err = ChainVaultError::Admission {
            kind: "share".into(),
            attempts: 5,
            last: "timeout".into(),
        };
        assert!(err.to_string().contains("5 attempts"));
    }
}
