//! Error types for the memory core.
//!
//! One error enum covers every failure kind the operation surface can
//! return. Validation errors for closed enums carry a "Did you mean ...?"
//! hint so callers can repair typos without consulting docs.

use std::path::PathBuf;

/// Core error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MamaError {
    /// Missing/invalid field, out-of-range numeric, enum mismatch
    #[error("{message}{}", .hint.as_deref().map(|h| format!(" {h}")).unwrap_or_default())]
    Validation {
        /// What was wrong with the input
        message: String,
        /// Optional repair suggestion ("Did you mean SUCCESS?")
        hint: Option<String>,
    },
    /// Entity or link not found
    #[error("not found: {0}")]
    NotFound(String),
    /// Duplicate link, outcome constraint violated, writer contention
    #[error("conflict: {0}")]
    Conflict(String),
    /// Embedding norm, referential integrity
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
    /// Cleanup precondition: no checksum-valid backup newer than 24 h
    #[error("no recent backup: {0}. Create a backup within 24 h before executing cleanup")]
    NoRecentBackup(String),
    /// Backup file bytes do not match the manifest checksum
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .file.display())]
    ChecksumMismatch {
        /// Backup file that failed verification
        file: PathBuf,
        /// Checksum recorded in the manifest
        expected: String,
        /// Checksum of the bytes on disk
        actual: String,
    },
    /// Embedding provider failure; callers may store the entity without a vector
    #[error("embedding unavailable: {0}")]
    EmbedUnavailable(String),
    /// Deadline exceeded; partial work has been rolled back
    #[error("deadline exceeded during {0}")]
    Timeout(String),
    /// Cooperative cancellation observed
    #[error("operation cancelled")]
    Cancelled,
    /// Required environment variable absent
    #[error("missing required environment: {0}")]
    MissingEnv(String),
    /// Underlying SQLite error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Filesystem error (backups, default paths)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Storage open/integrity error that is not a plain SQLite error
    #[error("storage error: {0}")]
    Storage(String),
}

/// Core result type
pub type Result<T> = std::result::Result<T, MamaError>;

impl MamaError {
    /// Validation error without a repair hint
    pub fn validation(message: impl Into<String>) -> Self {
        MamaError::Validation {
            message: message.into(),
            hint: None,
        }
    }

    /// Validation error with a "Did you mean ...?" hint
    pub fn validation_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        MamaError::Validation {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Enum-mismatch validation error with a nearest-match suggestion
    /// computed by edit distance over the accepted values.
    pub fn unknown_variant(field: &str, got: &str, accepted: &[&'static str]) -> Self {
        let message = format!(
            "invalid {field}: '{got}' (accepted: {})",
            accepted.join(", ")
        );
        match nearest_match(got, accepted) {
            Some(best) => Self::validation_with_hint(message, format!("Did you mean {best}?")),
            None => Self::validation(message),
        }
    }

    /// Exit code contract for CLI wrappers:
    /// 0 success, 1 validation failure, 2 missing environment,
    /// 3 storage open/integrity error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MamaError::MissingEnv(_) => 2,
            MamaError::Database(_) | MamaError::Io(_) | MamaError::Storage(_) => 3,
            _ => 1,
        }
    }
}

/// Nearest accepted value by Levenshtein distance, if close enough to be a
/// plausible typo (distance at most half the input length, and never more
/// than 3).
pub fn nearest_match(got: &str, accepted: &[&'static str]) -> Option<&'static str> {
    let got_lower = got.to_lowercase();
    let max_distance = (got.len() / 2).clamp(1, 3);
    accepted
        .iter()
        .map(|candidate| {
            (
                strsim::levenshtein(&got_lower, &candidate.to_lowercase()),
                *candidate,
            )
        })
        .filter(|(distance, _)| *distance <= max_distance)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_variant_suggests_nearest() {
        let err = MamaError::unknown_variant("outcome", "Succes", &["SUCCESS", "FAILED"]);
        let text = err.to_string();
        assert!(text.contains("Did you mean SUCCESS?"), "got: {text}");
    }

    #[test]
    fn test_unknown_variant_no_hint_when_far() {
        let err = MamaError::unknown_variant("outcome", "zzzzzzzzzz", &["SUCCESS", "FAILED"]);
        assert!(!err.to_string().contains("Did you mean"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MamaError::validation("bad").exit_code(), 1);
        assert_eq!(MamaError::MissingEnv("MAMA_DB_PATH".into()).exit_code(), 2);
        assert_eq!(MamaError::Storage("corrupt header".into()).exit_code(), 3);
        assert_eq!(MamaError::NotFound("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_validation_display_includes_hint() {
        let err = MamaError::validation_with_hint("invalid outcome: 'Succes'", "Did you mean SUCCESS?");
        assert_eq!(
            err.to_string(),
            "invalid outcome: 'Succes' Did you mean SUCCESS?"
        );
    }
}
