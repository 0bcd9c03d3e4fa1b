//! Error types for the HPLC environment abstraction.

use thiserror::Error;

/// Errors that can occur at the boundary between an engine and its driver.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The command mailbox or reply channel was closed (runtime shut down)
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(what: impl Into<String>) -> Self {
        Self::ChannelClosed(what.into())
    }
    
    /// Creates a timeout error from a duration.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout(after.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    
    #[test]
    fn test_timeout_message() {
        let err = EnvError::timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Timeout after 250ms");
    }
    
    #[test]
    fn test_closed_message() {
        let err = EnvError::closed("command mailbox");
        assert_eq!(err.to_string(), "Channel closed: command mailbox");
    }
}
