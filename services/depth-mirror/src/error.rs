use thiserror::Error;
use types::errors::TransportError;

/// Errors surfaced by the depth mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl MirrorError {
    /// Whether the failure came from the exchange (error status or close frame).
    pub fn is_remote(&self) -> bool {
        matches!(self, MirrorError::Transport(err) if err.is_remote())
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(MirrorError::from(TransportError::ConnectionClosed).is_remote());
        assert!(!MirrorError::from(TransportError::Connect("refused".to_string())).is_remote());
        assert!(!MirrorError::Config("bad".to_string()).is_remote());
    }
}
