//! Error types and handling for mapsync
//!
//! Every fallible operation in the workspace reports one of these variants.
//! `ErrorKind` drives the process exit status and `should_retry` decides
//! whether a request is worth another attempt.

use std::path::PathBuf;

/// Main error type for mapsync operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// Local I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found
        path: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Transport failure: unreachable host, refused connection, broken stream
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// The server answered with a non-success status
    #[error("Request to {url} failed with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// A remote resource could not be interpreted
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message describing the malformed content
        message: String,
    },

    /// A compressed payload could not be decoded
    #[error("Decode error: {message}")]
    Decode {
        /// Error message from the decoder
        message: String,
    },

    /// A decoded payload does not hash to the catalog value
    #[error("Verification failed for {name}: expected {expected}, got {actual}")]
    Verification {
        /// Catalog entry name
        name: String,
        /// Digest listed in the catalog
        expected: String,
        /// Digest of the downloaded content
        actual: String,
    },

    /// The user (or the reply policy) refused to continue
    #[error("Declined to continue after tool mismatch")]
    Declined,

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Local I/O errors
    Io,
    /// Configuration errors
    Config,
    /// Network and status errors
    Network,
    /// Malformed remote content
    Protocol,
    /// Corrupt compressed payloads
    Decode,
    /// Digest mismatch after download
    Verification,
    /// Confirmation declined
    Declined,
    /// Cancellation
    Cancelled,
    /// Timeout
    Timeout,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::FileNotFound { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::Network { .. } | Self::Status { .. } => ErrorKind::Network,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Verification { .. } => ErrorKind::Verification,
            Self::Declined => ErrorKind::Declined,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check if repeating the request could succeed
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new status error
    pub fn status<S: Into<String>>(status: u16, url: S) -> Self {
        Self::Status {
            status,
            url: url.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    proptest! {
        #[test]
        fn test_only_transport_errors_retry(message in ".*", status in 100u16..600u16) {
            let errors = vec![
                Error::Io { message: message.clone() },
                Error::Config { message: message.clone() },
                Error::Protocol { message: message.clone() },
                Error::Decode { message: message.clone() },
                Error::Other { message: message.clone() },
            ];

            for error in errors {
                prop_assert!(!error.should_retry(), "{} should not retry", error);
            }
            let network_error = Error::Network { message };
            prop_assert!(network_error.should_retry());
            let status_error = Error::Status { status, url: "http://example.invalid".to_string() };
            prop_assert_eq!(status_error.should_retry(), status >= 500 || status == 408 || status == 429);
        }

        #[test]
        fn test_timeout_error_properties(seconds in 1u64..3600u64) {
            let error = Error::Timeout { seconds };

            prop_assert_eq!(error.kind(), ErrorKind::Timeout);
            prop_assert!(error.should_retry());
        }
    }

    #[rstest]
    #[case(500, true)]
    #[case(503, true)]
    #[case(429, true)]
    #[case(408, true)]
    #[case(404, false)]
    #[case(403, false)]
    fn test_status_retry(#[case] status: u16, #[case] retry: bool) {
        let error = Error::status(status, "http://example.invalid/MAPS");
        assert_eq!(error.kind(), ErrorKind::Network);
        assert_eq!(error.should_retry(), retry);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "maps/a.map");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("maps/a.map"));
    }

    #[test]
    fn test_io_errors_do_not_retry() {
        let error = Error::from(std::io::Error::new(std::io::ErrorKind::Interrupted, "read"));
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(!error.should_retry());
    }

    #[test]
    fn test_fatal_errors() {
        for error in [
            Error::config("bad reply"),
            Error::protocol("no version token"),
            Error::decode("bad gzip header"),
            Error::Declined,
            Error::Cancelled,
        ] {
            assert!(!error.should_retry(), "{error} should not retry");
        }
        assert_eq!(Error::Declined.kind(), ErrorKind::Declined);
    }
}
