//! Error types and handling for Energy Price Level
//!
//! This module defines the error types used throughout the crate, covering
//! configuration, persistence, setup validation and the per-update failures
//! of the price level sensor.

use thiserror::Error;

/// Result type alias for Energy Price Level operations
pub type Result<T> = std::result::Result<T, PriceLevelError>;

/// Main error type for Energy Price Level
#[derive(Debug, Error)]
pub enum PriceLevelError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The upstream price entity has no state on the host
    #[error("Source sensor {entity_id} not found")]
    UpstreamMissing { entity_id: String },

    /// The upstream state is not a finite number
    #[error("Source sensor {entity_id} has invalid state: {value}")]
    UpstreamValueInvalid { entity_id: String, value: String },

    /// None of the recognized hourly price attributes is present
    #[error("No hourly prices found in source sensor {entity_id} attributes")]
    UpstreamAttributesMissing { entity_id: String },

    /// A percentage that no price level can be assigned to
    #[error("Invalid percentage: {value}")]
    InvalidPercentage { value: f64 },

    /// Setup referenced an entity the host does not know
    #[error("Sensor not found: {entity_id}")]
    SensorNotFound { entity_id: String },

    /// Setup tried to add a second entry for the same upstream entity
    #[error("Already configured: {unique_id}")]
    AlreadyConfigured { unique_id: String },
}

impl PriceLevelError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        PriceLevelError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        PriceLevelError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        PriceLevelError::Io {
            message: message.into(),
        }
    }

    pub fn upstream_missing<S: Into<String>>(entity_id: S) -> Self {
        PriceLevelError::UpstreamMissing {
            entity_id: entity_id.into(),
        }
    }

    pub fn upstream_value_invalid<S: Into<String>>(entity_id: S, value: S) -> Self {
        PriceLevelError::UpstreamValueInvalid {
            entity_id: entity_id.into(),
            value: value.into(),
        }
    }

    pub fn upstream_attributes_missing<S: Into<String>>(entity_id: S) -> Self {
        PriceLevelError::UpstreamAttributesMissing {
            entity_id: entity_id.into(),
        }
    }

    pub fn sensor_not_found<S: Into<String>>(entity_id: S) -> Self {
        PriceLevelError::SensorNotFound {
            entity_id: entity_id.into(),
        }
    }

    pub fn already_configured<S: Into<String>>(unique_id: S) -> Self {
        PriceLevelError::AlreadyConfigured {
            unique_id: unique_id.into(),
        }
    }

    /// Whether this error aborts a single sensor update without being fatal
    pub fn is_update_skip(&self) -> bool {
        matches!(
            self,
            PriceLevelError::UpstreamMissing { .. }
                | PriceLevelError::UpstreamValueInvalid { .. }
                | PriceLevelError::UpstreamAttributesMissing { .. }
        )
    }
}

impl From<std::io::Error> for PriceLevelError {
    fn from(err: std::io::Error) -> Self {
        PriceLevelError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PriceLevelError {
    fn from(err: serde_yaml::Error) -> Self {
        PriceLevelError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PriceLevelError {
    fn from(err: serde_json::Error) -> Self {
        PriceLevelError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PriceLevelError::config("test config error");
        assert!(matches!(err, PriceLevelError::Config { .. }));

        let err = PriceLevelError::upstream_missing("sensor.nordpool");
        assert!(matches!(err, PriceLevelError::UpstreamMissing { .. }));

        let err = PriceLevelError::validation("field", "test validation error");
        assert!(matches!(err, PriceLevelError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PriceLevelError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = PriceLevelError::upstream_value_invalid("sensor.nordpool", "unavailable");
        assert_eq!(
            format!("{}", err),
            "Source sensor sensor.nordpool has invalid state: unavailable"
        );
    }

    #[test]
    fn test_update_skip_classification() {
        assert!(PriceLevelError::upstream_missing("a").is_update_skip());
        assert!(PriceLevelError::upstream_attributes_missing("a").is_update_skip());
        assert!(!PriceLevelError::sensor_not_found("a").is_update_skip());
        assert!(!PriceLevelError::InvalidPercentage { value: f64::NAN }.is_update_skip());
    }
}
