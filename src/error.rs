//! Error types for Gatepass
//!
//! This module provides a comprehensive error type hierarchy using `thiserror`
//! for proper error handling across all components, plus the stable numeric
//! codes reported to callers in task result views.

use thiserror::Error;

/// The main error type for Gatepass operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Session-level browser errors (navigation, DOM, script)
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Solving strategy errors
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Task registry errors
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Credential / balance errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP errors from challenge payload downloads
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser pool lifecycle errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// No concurrency slot available, pool uninitialized, or pool draining
    #[error("No browser session slot available: {0}")]
    ResourceExhausted(String),

    /// A single browser process failed to start (tolerated unless all fail)
    #[error("Failed to launch browser process: {0}")]
    LaunchFailed(String),

    /// Every launch attempt failed; the pool cannot operate
    #[error("No browser processes could be launched")]
    NoProcesses,
}

/// Errors within a single browsing session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session creation on a live process failed
    #[error("Failed to create session: {0}")]
    CreationFailed(String),

    /// Navigation failed or the page never became ready
    #[error("Navigation to {url} failed: {reason}")]
    Navigation {
        /// Target URL
        url: String,
        /// Failure detail
        reason: String,
    },

    /// A DOM step exceeded its timeout
    #[error("Session operation timed out after {0}ms")]
    Timeout(u64),

    /// Script evaluation failed
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// Session already closed
    #[error("Session already closed")]
    Closed,
}

/// Errors raised by challenge solving strategies
#[derive(Error, Debug)]
pub enum StrategyError {
    /// The challenge provider throttled this strategy; escalate to the
    /// fallback immediately instead of burning remaining sub-attempts.
    #[error("Strategy rate-limited by challenge provider")]
    RateLimited,

    /// Challenge content the strategy cannot interpret
    #[error("Unsupported challenge content: {0}")]
    Unsupported(String),

    /// Ordinary strategy failure after its sub-attempt budget
    #[error("Strategy failed: {0}")]
    Failed(String),
}

/// Task registry and lifecycle errors
#[derive(Error, Debug)]
pub enum TaskError {
    /// Unknown task id
    #[error("Task not found")]
    NotFound,

    /// Registry at capacity and nothing evictable
    #[error("Task registry full ({0} tasks)")]
    RegistryFull(usize),

    /// Illegal lifecycle transition (statuses are monotonic)
    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Retry budget exhausted across all strategies
    #[error("Challenge unsolvable after {attempts} attempts")]
    Unsolvable {
        /// Attempts consumed
        attempts: u32,
    },

    /// Task spec missing or malformed required parameters
    #[error("Bad task parameters: {0}")]
    BadParameters(String),
}

/// Credential and balance errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Credential key not present in the ledger
    #[error("Unknown credential key")]
    UnknownKey,

    /// Balance too low to start the task
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(f64),

    /// Credential past its expiry
    #[error("Credential expired")]
    Expired,
}

/// Result type alias for Gatepass operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric error codes surfaced in task result views.
///
/// Internal error text never reaches callers verbatim; a result view carries
/// one of these codes plus a short stable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    /// No error
    pub const SUCCESS: ErrorCode = ErrorCode(0);
    /// Credential key does not exist
    pub const KEY_DOES_NOT_EXIST: ErrorCode = ErrorCode(1);
    /// No pool slot available
    pub const NO_SLOT_AVAILABLE: ErrorCode = ErrorCode(2);
    /// Zero or insufficient balance
    pub const ZERO_BALANCE: ErrorCode = ErrorCode(3);
    /// Unknown task id
    pub const WRONG_TASK_ID: ErrorCode = ErrorCode(10);
    /// Task timed out
    pub const TIMEOUT: ErrorCode = ErrorCode(11);
    /// Challenge provider blocked the session
    pub const BLOCKED: ErrorCode = ErrorCode(12);
    /// Proxy connection refused
    pub const PROXY_REFUSED: ErrorCode = ErrorCode(13);
    /// Retry budget exhausted
    pub const UNSOLVABLE: ErrorCode = ErrorCode(14);
    /// Missing/invalid task parameters
    pub const BAD_PARAMETERS: ErrorCode = ErrorCode(15);
    /// Internal error
    pub const INTERNAL: ErrorCode = ErrorCode(99);
}

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// True when the error is the strategy fast-fail signal
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Strategy(StrategyError::RateLimited))
    }

    /// Map this error to the stable code + short message reported to callers.
    pub fn to_wire(&self) -> (ErrorCode, String) {
        match self {
            Error::Pool(PoolError::ResourceExhausted(_)) => {
                (ErrorCode::NO_SLOT_AVAILABLE, "No solving slot available".into())
            }
            Error::Pool(_) => (ErrorCode::INTERNAL, "Browser pool unavailable".into()),
            Error::Session(SessionError::Timeout(_)) => {
                (ErrorCode::TIMEOUT, "Task timed out".into())
            }
            Error::Session(_) => (ErrorCode::INTERNAL, "Browser session failed".into()),
            Error::Strategy(StrategyError::RateLimited) => {
                (ErrorCode::BLOCKED, "Challenge provider rate-limited the solver".into())
            }
            Error::Strategy(_) => (ErrorCode::UNSOLVABLE, "Challenge could not be solved".into()),
            Error::Task(TaskError::NotFound) => (ErrorCode::WRONG_TASK_ID, "Task not found".into()),
            Error::Task(TaskError::Unsolvable { attempts }) => (
                ErrorCode::UNSOLVABLE,
                format!("Challenge unsolvable after {} attempts", attempts),
            ),
            Error::Task(TaskError::BadParameters(_)) => {
                (ErrorCode::BAD_PARAMETERS, "Missing or invalid task parameters".into())
            }
            Error::Task(_) => (ErrorCode::INTERNAL, "Task registry error".into()),
            Error::Auth(AuthError::UnknownKey) => {
                (ErrorCode::KEY_DOES_NOT_EXIST, "Credential key does not exist".into())
            }
            Error::Auth(AuthError::InsufficientBalance(_)) | Error::Auth(AuthError::Expired) => {
                (ErrorCode::ZERO_BALANCE, "Insufficient balance".into())
            }
            _ => (ErrorCode::INTERNAL, "Internal error".into()),
        }
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Pool(PoolError::LaunchFailed("no chrome".to_string()));
        assert!(err.to_string().contains("Failed to launch browser process"));
        assert!(err.to_string().contains("no chrome"));
    }

    #[test]
    fn test_rate_limited_detection() {
        assert!(Error::Strategy(StrategyError::RateLimited).is_rate_limited());
        assert!(!Error::Strategy(StrategyError::Failed("x".into())).is_rate_limited());
    }

    #[test]
    fn test_wire_codes_are_stable() {
        let (code, msg) = Error::Task(TaskError::Unsolvable { attempts: 3 }).to_wire();
        assert_eq!(code, ErrorCode::UNSOLVABLE);
        assert!(msg.contains("3 attempts"));

        let (code, _) = Error::Auth(AuthError::UnknownKey).to_wire();
        assert_eq!(code, ErrorCode::KEY_DOES_NOT_EXIST);

        let (code, _) = Error::Pool(PoolError::ResourceExhausted("draining".into())).to_wire();
        assert_eq!(code, ErrorCode::NO_SLOT_AVAILABLE);
    }

    #[test]
    fn test_wire_never_leaks_internal_text() {
        let err = Error::Session(SessionError::Script(
            "ReferenceError: grecaptcha is not defined at eval line 3".to_string(),
        ));
        let (code, msg) = err.to_wire();
        assert_eq!(code, ErrorCode::INTERNAL);
        assert!(!msg.contains("ReferenceError"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = TaskError::InvalidTransition {
            from: "ready".into(),
            to: "processing".into(),
        };
        assert_eq!(err.to_string(), "Invalid task transition: ready -> processing");
    }
}
