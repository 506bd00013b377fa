// src/error.rs
// Standardized error types for linear-fast

use thiserror::Error;

/// Main error type for the linear-fast library
#[derive(Error, Debug)]
pub enum LinearFastError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(
        "Linear database not found at {0}. Please ensure Linear.app is installed and has been opened at least once."
    )]
    DatabaseNotFound(String),

    #[error("could not find Linear database in IndexedDB")]
    NoLinearDatabases,

    #[error("account scope matched nothing: {0}")]
    ScopeMisconfigured(String),

    #[error("store read error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown error: {0}")]
    Other(String),
}

/// Convenience type alias for Result using LinearFastError
pub type Result<T> = std::result::Result<T, LinearFastError>;

impl From<String> for LinearFastError {
    fn from(s: String) -> Self {
        LinearFastError::Other(s)
    }
}

/// Error code carried by [`OfficialToolError`] across the tool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficialErrorCode {
    /// The upstream returned a successful RPC with `isError=true`.
    /// Semantic failure from the server; never retried, never masked.
    ToolError,
    /// Transport-level failure after the internal retry was exhausted.
    Unavailable,
}

impl OfficialErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfficialErrorCode::ToolError => "official_tool_error",
            OfficialErrorCode::Unavailable => "official_unavailable",
        }
    }
}

impl std::fmt::Display for OfficialErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a call through the official Linear MCP fails.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct OfficialToolError {
    pub code: OfficialErrorCode,
    pub message: String,
}

impl OfficialToolError {
    pub fn tool_error(message: impl Into<String>) -> Self {
        Self {
            code: OfficialErrorCode::ToolError,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: OfficialErrorCode::Unavailable,
            message: message.into(),
        }
    }

    /// Semantic errors are returned by the server on purpose and must be
    /// propagated unchanged instead of triggering fallback.
    pub fn is_semantic(&self) -> bool {
        self.code == OfficialErrorCode::ToolError
    }
}

/// Why a local read handler declined to serve a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Tool name has no registered local handler.
    UnsupportedTool,
    /// The local cache is degraded and the caller did not allow stale data.
    DegradedLocal,
    /// The handler exists but a requested filter is only available upstream.
    UnsupportedFilter,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::UnsupportedTool => "unsupported_tool",
            FallbackReason::DegradedLocal => "degraded_local",
            FallbackReason::UnsupportedFilter => "unsupported_filter",
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a local handler call. `Fallback` is routing control flow and
/// never escapes the router; `Internal` covers unexpected handler failures,
/// which the router answers by falling back upstream.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{reason}: {message}")]
    Fallback {
        reason: FallbackReason,
        message: String,
    },

    #[error("local handler failed: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn fallback(reason: FallbackReason, message: impl Into<String>) -> Self {
        HandlerError::Fallback {
            reason,
            message: message.into(),
        }
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            HandlerError::Fallback { reason, .. } => Some(*reason),
            HandlerError::Internal(_) => None,
        }
    }
}
