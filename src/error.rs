//! Error types and handling for pylonlink
//!
//! One error enum covers the whole crate. The first four variants mirror the
//! failure kinds a poll cycle can end in; the rest are ambient (configuration,
//! files, serialization) and only show up around startup or persistence.

use thiserror::Error;

/// Result type alias for pylonlink operations
pub type Result<T> = std::result::Result<T, PylonError>;

/// Main error type for pylonlink
#[derive(Debug, Error)]
pub enum PylonError {
    /// Serial port I/O failure (absent port, permissions, disconnect)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Console answered without the expected table header
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// A single console line could not be converted
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// The power table yielded no usable module rows
    #[error("Empty result: {message}")]
    EmptyResult { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// An exchange was interrupted by shutdown
    #[error("Cancelled: {message}")]
    Cancelled { message: String },
}

impl PylonError {
    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new row-level parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new empty-result error
    pub fn empty_result<S: Into<String>>(message: S) -> Self {
        Self::EmptyResult {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Whether this error ends the current poll tick.
    ///
    /// Row-level parse problems are recovered inside the parser and never
    /// reach the session as an error, so they are the one non-fatal kind.
    pub fn is_fatal_for_tick(&self) -> bool {
        !matches!(self, Self::Parse { .. })
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Protocol { .. } => "protocol",
            Self::Parse { .. } => "parse",
            Self::EmptyResult { .. } => "empty_result",
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<std::io::Error> for PylonError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serialport::Error> for PylonError {
    fn from(err: serialport::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<serde_yaml::Error> for PylonError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PylonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for PylonError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime".to_string(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PylonError::transport("port gone");
        assert!(matches!(err, PylonError::Transport { .. }));

        let err = PylonError::protocol("no header");
        assert!(matches!(err, PylonError::Protocol { .. }));

        let err = PylonError::validation("serial.port", "empty");
        assert!(matches!(err, PylonError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PylonError::empty_result("no modules");
        assert_eq!(err.to_string(), "Empty result: no modules");

        let err = PylonError::validation("battery.module_capacity_kwh", "must be positive");
        assert_eq!(
            err.to_string(),
            "Validation error: battery.module_capacity_kwh - must be positive"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PylonError::transport("x").is_fatal_for_tick());
        assert!(PylonError::protocol("x").is_fatal_for_tick());
        assert!(PylonError::empty_result("x").is_fatal_for_tick());
        assert!(!PylonError::parse("x").is_fatal_for_tick());
    }

    #[test]
    fn test_io_conversion_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such device");
        let err: PylonError = io.into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("no such device"));
    }
}
