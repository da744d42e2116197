//! Error types and handling for Selene
//!
//! Every subsystem reports failures through [`SeleneError`]. Bootstrap stages
//! wrap the underlying cause with the name of the failing subsystem so that a
//! startup abort tells the operator exactly what went wrong.

use thiserror::Error;

/// Result type alias for Selene operations
pub type Result<T> = std::result::Result<T, SeleneError>;

/// Main error type for Selene
#[derive(Debug, Error)]
pub enum SeleneError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A device or vehicle does not expose the requested capability.
    ///
    /// This is a normal signal that drives capability fallback, not a failure.
    #[error("capability not available")]
    NotAvailable,

    /// Device construction or query errors
    #[error("Device error: {message}")]
    Device { message: String },

    /// MQTT broker errors
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    /// Embedded scripting errors
    #[error("Script error: {message}")]
    Script { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Remote API errors (token endpoints, push services, telemetry sink)
    #[error("API error: {message}")]
    Api { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// A failure wrapped with the stage or subsystem it happened in
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SeleneError>,
    },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl SeleneError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        SeleneError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        SeleneError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        SeleneError::Device {
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        SeleneError::Mqtt {
            message: message.into(),
        }
    }

    /// Create a new scripting error
    pub fn script<S: Into<String>>(message: S) -> Self {
        SeleneError::Script {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        SeleneError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        SeleneError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        SeleneError::Api {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        SeleneError::Auth {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        SeleneError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        SeleneError::Generic {
            message: message.into(),
        }
    }

    /// Wrap this error with the stage it occurred in
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        SeleneError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) means "capability not available"
    pub fn is_not_available(&self) -> bool {
        match self {
            SeleneError::NotAvailable => true,
            SeleneError::Context { source, .. } => source.is_not_available(),
            _ => false,
        }
    }
}

/// Attach stage context to any `Result<T, SeleneError>`
pub trait ResultExt<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}

impl From<std::io::Error> for SeleneError {
    fn from(err: std::io::Error) -> Self {
        SeleneError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SeleneError {
    fn from(err: serde_yaml::Error) -> Self {
        SeleneError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SeleneError {
    fn from(err: serde_json::Error) -> Self {
        SeleneError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for SeleneError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SeleneError::timeout(err.to_string())
        } else if err.is_decode() {
            SeleneError::Serialization {
                message: err.to_string(),
            }
        } else {
            SeleneError::network(err.to_string())
        }
    }
}

impl From<Box<rhai::EvalAltResult>> for SeleneError {
    fn from(err: Box<rhai::EvalAltResult>) -> Self {
        SeleneError::script(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SeleneError::config("test config error");
        assert!(matches!(err, SeleneError::Config { .. }));

        let err = SeleneError::mqtt("test mqtt error");
        assert!(matches!(err, SeleneError::Mqtt { .. }));

        let err = SeleneError::validation("field", "test validation error");
        assert!(matches!(err, SeleneError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = SeleneError::config("test error");
        assert_eq!(err.to_string(), "Configuration error: test error");

        let err = SeleneError::validation("test_field", "invalid value");
        assert_eq!(err.to_string(), "Validation error: test_field - invalid value");
    }

    #[test]
    fn test_context_wraps_and_keeps_not_available() {
        let err = SeleneError::NotAvailable.context("charger");
        assert_eq!(err.to_string(), "charger: capability not available");
        assert!(err.is_not_available());

        let err: Result<()> = Err(SeleneError::generic("missing loadpoints"));
        let err = err.context("failed configuring site").unwrap_err();
        assert!(!err.is_not_available());
        assert_eq!(
            err.to_string(),
            "failed configuring site: Error: missing loadpoints"
        );
    }
}
