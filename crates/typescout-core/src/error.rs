use thiserror::Error;

use crate::offset::FieldId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    #[error("Memory backend does not support writes")]
    WriteUnsupported,

    #[error("Section not found: {0}")]
    SectionMissing(String),

    #[error("Invalid executable image: {0}")]
    InvalidImage(String),

    #[error("Root anchor not found: {0}")]
    AnchorNotFound(&'static str),

    #[error("Offset for {field} not found: {reason}")]
    FieldNotFound { field: FieldId, reason: String },

    #[error("Offset for {field} requires {requires} which is not discovered")]
    MissingPrerequisite { field: FieldId, requires: String },

    #[error("{stage} requires {requires} which is not available")]
    Unavailable {
        stage: &'static str,
        requires: String,
    },

    #[error("Routine not found: {0}")]
    RoutineNotFound(&'static str),

    #[error("Too few samples for {field}: found {found}, need {required}")]
    TooFewSamples {
        field: FieldId,
        found: usize,
        required: usize,
    },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    pub(crate) fn not_found(field: FieldId, reason: impl Into<String>) -> Self {
        Error::FieldNotFound {
            field,
            reason: reason.into(),
        }
    }

    /// Whether a stage was skipped rather than attempted
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Error::MissingPrerequisite { .. } | Error::Unavailable { .. }
        )
    }

    pub(crate) fn requires(field: FieldId, requires: impl std::fmt::Display) -> Self {
        Error::MissingPrerequisite {
            field,
            requires: requires.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.is_not_found());

        let other_io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err2 = Error::Io(other_io_err);
        assert!(!err2.is_not_found());
    }

    #[test]
    fn test_skip_classification() {
        assert!(Error::requires(FieldId::StructSize, FieldId::StructSuper).is_skip());
        let unavailable = Error::Unavailable {
            stage: "precision",
            requires: "world".to_string(),
        };
        assert!(unavailable.is_skip());
        assert_eq!(
            unavailable.to_string(),
            "precision requires world which is not available"
        );
        assert!(!Error::not_found(FieldId::ObjectName, "no agreement").is_skip());
    }

    #[test]
    fn test_field_error_message_uses_dotted_name() {
        let err = Error::TooFewSamples {
            field: FieldId::FunctionFlags,
            found: 2,
            required: 5,
        };
        assert_eq!(
            err.to_string(),
            "Too few samples for function.flags: found 2, need 5"
        );
    }
}
