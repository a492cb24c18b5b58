//! Common error types for the bridge

use thiserror::Error;

/// Common result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the bridge crates
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error (wraps serde_json::Error)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rate limit retries exhausted; the CRM kept answering 429
    #[error("Rate limited after retries: {context}")]
    RateLimited { context: String },

    /// CRM-side validation failure (carries the reported category)
    #[error("Validation failure ({category}): {message}")]
    Validation { category: String, message: String },

    /// No association label exists in either direction between two object
    /// types; requires operator action in the CRM
    #[error("No association label between {from} and {to}; create one in the CRM settings")]
    AssociationLabelMissing { from: String, to: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the CRM rejected a batch upsert because the chosen id
    /// property is not actually unique. Callers switch to the one-at-a-time
    /// search-then-write fallback on this.
    pub fn is_non_unique_property(&self) -> bool {
        match self {
            Error::Validation { category, message } => {
                category == "VALIDATION_ERROR" && message.to_lowercase().contains("non-unique")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_unique_detection_requires_category_and_text() {
        let e = Error::Validation {
            category: "VALIDATION_ERROR".into(),
            message: "Property 'numero_telefono_id_unico' is non-unique".into(),
        };
        assert!(e.is_non_unique_property());

        let other = Error::Validation {
            category: "VALIDATION_ERROR".into(),
            message: "missing required property".into(),
        };
        assert!(!other.is_non_unique_property());

        assert!(!Error::Internal("non-unique".into()).is_non_unique_property());
    }
}
