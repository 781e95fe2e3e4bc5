//! Error kinds for codepal operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to react: configuration kinds
/// abort startup, model-call kinds are downgraded to a friendly fallback by
/// the tutor, menu kinds are reported back to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid argument passed to a function
    InvalidArgument,

    // =========================================================================
    // Configuration errors
    // =========================================================================
    /// A mandatory setting (e.g. the access credential) is absent
    ConfigMissing,

    /// A setting is present but unusable
    ConfigInvalid,

    // =========================================================================
    // Model call errors
    // =========================================================================
    /// The request never produced an HTTP response (connect, timeout, body read)
    NetworkFailed,

    /// The service answered with a non-success status
    ServiceFailed,

    /// The service answered successfully but without usable payload text
    EmptyResponse,

    /// Payload text was present but does not match the expected contract
    DecodeFailed,

    // =========================================================================
    // Curriculum errors
    // =========================================================================
    /// No level with the requested id exists
    LevelNotFound,

    /// The level exists but its predecessor has not been completed
    LevelLocked,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Configuration
            ErrorKind::ConfigMissing => "ConfigMissing",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            // Model calls
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::ServiceFailed => "ServiceFailed",
            ErrorKind::EmptyResponse => "EmptyResponse",
            ErrorKind::DecodeFailed => "DecodeFailed",

            // Curriculum
            ErrorKind::LevelNotFound => "LevelNotFound",
            ErrorKind::LevelLocked => "LevelLocked",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::NetworkFailed | ErrorKind::EmptyResponse)
    }

    /// Check if this error kind comes from a model call.
    ///
    /// These are the kinds the tutor swallows into an in-character fallback.
    pub fn is_model_call(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailed
                | ErrorKind::ServiceFailed
                | ErrorKind::EmptyResponse
                | ErrorKind::DecodeFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
