//! Harvesting error types
//!
//! Error definitions with transient/permanent classification for retry
//! logic, plus capability signals that drive pagination-strategy downgrade.

use thiserror::Error;

/// Error that can occur during a directory harvest.
#[derive(Debug, Error)]
pub enum HarvestError {
    // Connection errors (usually transient)
    /// Failed to establish or keep a connection to the directory server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection or operation timed out.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    // Authentication errors (permanent)
    /// Invalid bind credentials.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Capability signals (not failures; drive strategy downgrade)
    /// The server refused to deliver further pages because the cumulative
    /// result cap for this search was reached. Distinguished from an
    /// ordinary end-of-results signal.
    #[error("cumulative size limit exceeded: {message}")]
    SizeLimitExceeded { message: String },

    /// The server or client library does not support the requested paging
    /// mechanism.
    #[error("paging not supported: {message}")]
    PagingUnsupported { message: String },

    // Logical invariant violations (fatal, never retried)
    /// The range cursor did not strictly advance between chunks, which
    /// indicates a non-unique or non-ordered id attribute.
    #[error("range cursor stalled at '{cursor}'")]
    StalledCursor { cursor: String },

    /// The configured chunk-count ceiling was reached before the result
    /// set was exhausted.
    #[error("safety chunk limit of {limit} exceeded")]
    SafetyLimitExceeded { limit: u32 },

    /// Reconnect attempts were exhausted while fetching a chunk.
    #[error("connection retries exhausted after {attempts} attempts")]
    ConnectionExhausted { attempts: u32 },

    // Data errors
    /// A single entry could not be processed (recovered per-entry).
    #[error("invalid entry: {message}")]
    InvalidEntry { message: String },

    // Configuration errors (permanent)
    /// The harvest or connection configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Operation errors
    /// A search returned a non-success result unrelated to paging.
    #[error("search failed: {message}")]
    SearchFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A persistence collaborator rejected a batch or the index load.
    #[error("persistence failed: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HarvestError {
    /// Check if this error is transient and the operation should be
    /// retried after a reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::ConnectionFailed { .. } | HarvestError::ConnectionTimeout { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient() && !self.is_capability_signal()
    }

    /// Check if this error is a protocol capability signal rather than a
    /// failure. Capability signals trigger strategy downgrade instead of
    /// aborting the run.
    pub fn is_capability_signal(&self) -> bool {
        matches!(
            self,
            HarvestError::SizeLimitExceeded { .. } | HarvestError::PagingUnsupported { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            HarvestError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            HarvestError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            HarvestError::AuthenticationFailed => "AUTH_FAILED",
            HarvestError::SizeLimitExceeded { .. } => "SIZE_LIMIT_EXCEEDED",
            HarvestError::PagingUnsupported { .. } => "PAGING_UNSUPPORTED",
            HarvestError::StalledCursor { .. } => "STALLED_CURSOR",
            HarvestError::SafetyLimitExceeded { .. } => "SAFETY_LIMIT_EXCEEDED",
            HarvestError::ConnectionExhausted { .. } => "CONNECTION_EXHAUSTED",
            HarvestError::InvalidEntry { .. } => "INVALID_ENTRY",
            HarvestError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            HarvestError::SearchFailed { .. } => "SEARCH_FAILED",
            HarvestError::Persistence { .. } => "PERSISTENCE_FAILED",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        HarvestError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        HarvestError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search failed error.
    pub fn search_failed(message: impl Into<String>) -> Self {
        HarvestError::SearchFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a search failed error with source.
    pub fn search_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        HarvestError::SearchFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a size limit exceeded signal.
    pub fn size_limit(message: impl Into<String>) -> Self {
        HarvestError::SizeLimitExceeded {
            message: message.into(),
        }
    }

    /// Create a paging unsupported signal.
    pub fn paging_unsupported(message: impl Into<String>) -> Self {
        HarvestError::PagingUnsupported {
            message: message.into(),
        }
    }

    /// Create an invalid entry error.
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        HarvestError::InvalidEntry {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        HarvestError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        HarvestError::Persistence {
            message: message.into(),
            source: None,
        }
    }

    /// Create a persistence error with source.
    pub fn persistence_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        HarvestError::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for harvest operations.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let transient = vec![
            HarvestError::connection_failed("test"),
            HarvestError::ConnectionTimeout { timeout_secs: 30 },
        ];
        for err in transient {
            assert!(
                err.is_transient(),
                "expected {} to be transient",
                err.error_code()
            );
            assert!(!err.is_permanent());
            assert!(!err.is_capability_signal());
        }
    }

    #[test]
    fn test_capability_signals() {
        let signals = vec![
            HarvestError::size_limit("cap reached"),
            HarvestError::paging_unsupported("no paged results control"),
        ];
        for err in signals {
            assert!(
                err.is_capability_signal(),
                "expected {} to be a capability signal",
                err.error_code()
            );
            assert!(!err.is_transient());
            assert!(!err.is_permanent());
        }
    }

    #[test]
    fn test_permanent_errors() {
        let permanent = vec![
            HarvestError::AuthenticationFailed,
            HarvestError::StalledCursor {
                cursor: "u100".to_string(),
            },
            HarvestError::SafetyLimitExceeded { limit: 1000 },
            HarvestError::ConnectionExhausted { attempts: 3 },
            HarvestError::invalid_config("bad chunk size"),
            HarvestError::persistence("sink rejected batch"),
        ];
        for err in permanent {
            assert!(
                err.is_permanent(),
                "expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_error_display() {
        let err = HarvestError::StalledCursor {
            cursor: "jdoe".to_string(),
        };
        assert_eq!(err.to_string(), "range cursor stalled at 'jdoe'");

        let err = HarvestError::SafetyLimitExceeded { limit: 500 };
        assert_eq!(err.to_string(), "safety chunk limit of 500 exceeded");
    }

    #[test]
    fn test_error_with_source() {
        let source = std::io::Error::other("socket closed");
        let err = HarvestError::connection_failed_with_source("bind lost", source);
        assert!(err.is_transient());
        if let HarvestError::ConnectionFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("expected ConnectionFailed variant");
        }
    }
}
