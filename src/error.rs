//! Error types for the Poloniex SDK

use thiserror::Error;

/// Main error type for the SDK
#[derive(Error, Debug, Clone)]
pub enum SdkError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Transport-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Failed to establish connection: {0}")]
    EstablishmentFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),
}

/// A named field of a push payload failed to parse.
///
/// The frame (or batch) that produced it is dropped; these never reach a delivery queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Ticker parsing {field}")]
    Ticker { field: &'static str },

    #[error("Market update order book parsing {field}")]
    OrderBook { field: &'static str },

    #[error("Market update new trade parsing {field}")]
    NewTrade { field: &'static str },
}

impl DecodeError {
    /// Name of the field that failed to parse
    pub fn field(&self) -> &'static str {
        match self {
            DecodeError::Ticker { field }
            | DecodeError::OrderBook { field }
            | DecodeError::NewTrade { field } => field,
        }
    }
}

/// Subscription-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Unknown channel name: {0}")]
    UnknownChannel(String),

    #[error("Already subscribed: {0}")]
    AlreadySubscribed(String),

    #[error("Client has been shut down")]
    Closed,
}

/// Channel directory bootstrap errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Ticker listing request failed: {0}")]
    Fetch(String),

    #[error("Malformed ticker listing: {0}")]
    Malformed(String),
}

/// Error severity levels
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Low,      // Dropped frames, expected noise
    Medium,   // Recoverable errors
    High,     // Errors that affect functionality
    Critical, // Construction-time failures
}

impl ErrorSeverity {
    pub fn from_error(error: &SdkError) -> Self {
        match error {
            SdkError::Configuration(_) => ErrorSeverity::High,
            SdkError::Authentication(_) => ErrorSeverity::High,
            SdkError::Directory(_) => ErrorSeverity::Critical,
            SdkError::Connection(conn_err) => match conn_err {
                ConnectionError::Timeout(_) => ErrorSeverity::Medium,
                ConnectionError::ConnectionLost(_) | ConnectionError::ReadFailed(_) => {
                    ErrorSeverity::Medium
                }
                _ => ErrorSeverity::High,
            },
            SdkError::Decode(_) => ErrorSeverity::Low,
            SdkError::Subscription(_) => ErrorSeverity::Medium,
            SdkError::Network(_) | SdkError::Server(_) => ErrorSeverity::Medium,
            SdkError::InvalidArgument(_) => ErrorSeverity::Low,
        }
    }
}

/// Error reporter for structured logging
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn report_error(error: &SdkError, operation: &str) {
        match ErrorSeverity::from_error(error) {
            ErrorSeverity::Critical => {
                tracing::error!(operation, "CRITICAL ERROR: {}", error);
            }
            ErrorSeverity::High => {
                tracing::error!(operation, "HIGH SEVERITY: {}", error);
            }
            ErrorSeverity::Medium => {
                tracing::warn!(operation, "MEDIUM SEVERITY: {}", error);
            }
            ErrorSeverity::Low => {
                tracing::debug!(operation, "LOW SEVERITY: {}", error);
            }
        }
    }
}
