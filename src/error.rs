//! Error handling for the federation simulator.
//!
//! This module provides:
//! - Comprehensive error types with context and chaining
//! - Machine-readable error codes grouped by subsystem
//! - User-friendly messages vs detailed internal messages
//! - Error logging with tracing integration
//!
//! Configuration and startup errors are fatal and abort the run before the
//! simulation starts; everything that happens after startup is handled
//! inside the protocol (acceptance rejections, batch failures, dead peers)
//! and never surfaces as a `SimError`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for simulator operations.
pub type Result<T> = std::result::Result<T, SimError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1000-1099)
    ConfigurationError,
    MissingConfiguration,
    InvalidConfiguration,
    UnknownPolicy,

    // Input errors (1100-1199)
    WorkloadError,
    PlatformError,
    FailureProfileError,

    // External script errors (1200-1299)
    ScriptNotFound,
    ScriptSpawnFailed,
    ScriptProtocolError,

    // Serialization errors (2000-2099)
    SerializationError,
    DeserializationError,
    InvalidJson,

    // Lifecycle errors (3000-3099)
    LifecycleOrderViolation,

    // Internal errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ConfigurationError => 1000,
            Self::MissingConfiguration => 1001,
            Self::InvalidConfiguration => 1002,
            Self::UnknownPolicy => 1003,

            Self::WorkloadError => 1100,
            Self::PlatformError => 1101,
            Self::FailureProfileError => 1102,

            Self::ScriptNotFound => 1200,
            Self::ScriptSpawnFailed => 1201,
            Self::ScriptProtocolError => 1202,

            Self::SerializationError => 2000,
            Self::DeserializationError => 2001,
            Self::InvalidJson => 2002,

            Self::LifecycleOrderViolation => 3000,

            Self::InternalError => 9000,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "configuration",
            1100..=1199 => "input",
            1200..=1299 => "script",
            2000..=2099 => "serialization",
            3000..=3099 => "lifecycle",
            _ => "internal",
        }
    }

    /// Whether this error aborts the run before the simulation starts.
    pub const fn is_startup_error(&self) -> bool {
        !matches!(self, Self::LifecycleOrderViolation | Self::InternalError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the simulator.
///
/// Supports structured error codes, user-friendly vs internal messages, and
/// source chaining.
#[derive(Error, Debug)]
pub struct SimError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl SimError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        }
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    /// Create an unknown-policy error.
    pub fn unknown_policy(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::UnknownPolicy,
            format!("Unknown scheduling policy: {}", name),
        )
    }

    /// Create a workload loading/parsing error.
    pub fn workload(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::WorkloadError,
            "Failed to load the workload file",
            message,
        )
    }

    /// Create a platform loading/parsing error.
    pub fn platform(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::PlatformError,
            "Failed to load the platform file",
            message,
        )
    }

    /// Create a failure-profile loading/parsing error.
    pub fn failure_profile(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::FailureProfileError,
            "Failed to load the hardware failure profile",
            message,
        )
    }

    /// Create a script-not-found error.
    pub fn script_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ScriptNotFound,
            format!("External script not found: {}", path),
        )
    }

    /// Create a script protocol error (bad JSON document on either pipe).
    pub fn script_protocol(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ScriptProtocolError,
            "External script violated the bid protocol",
            message,
        )
    }

    /// Create a lifecycle ordering violation. These are programmer errors.
    pub fn lifecycle_order(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::LifecycleOrderViolation, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal simulator error occurred",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        if self.code.is_startup_error() {
            error!(
                error_code = %code,
                category = category,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                "Startup error"
            );
        } else if self.code == ErrorCode::LifecycleOrderViolation {
            error!(
                error_code = %code,
                category = category,
                user_message = %self.user_message,
                "Lifecycle ordering violation"
            );
        } else {
            warn!(
                error_code = %code,
                category = category,
                user_message = %self.user_message,
                "Simulator error"
            );
            debug!(internal_message = ?self.internal_message, "Error details");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| SimError::new(code, e.to_string()).with_source(e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for SimError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_syntax() || error.is_data() {
            ErrorCode::DeserializationError
        } else if error.is_eof() {
            ErrorCode::InvalidJson
        } else {
            ErrorCode::SerializationError
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for SimError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let (code, user_msg) = match error.kind() {
            ErrorKind::NotFound => (ErrorCode::MissingConfiguration, "File not found"),
            _ => (ErrorCode::InternalError, "An I/O error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
