//! Unified error handling for the aerod fan-control platform
//!
//! This crate provides the single error type used across all aerod
//! components. It uses thiserror for ergonomic error definitions with
//! proper Display and Error trait impls.
//!
//! Note that the hardware access layer deliberately does NOT use this
//! type: a failed sysfs read is an expected runtime condition and is
//! reported as `None`/`false` at the call site. `AeroError` covers the
//! operations that can meaningfully refuse: profile loading, detection
//! start, and daemon lifecycle.

use std::io;
use std::path::PathBuf;

/// Result type alias using AeroError
pub type Result<T> = std::result::Result<T, AeroError>;

/// Unified error type for all aerod operations
#[derive(thiserror::Error, Debug)]
pub enum AeroError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A single sysfs read/write failed. Logged and treated as
    /// "value currently unavailable" by callers, never a crash.
    #[error("Transient I/O failure on {path}: {reason}")]
    TransientIo { path: PathBuf, reason: String },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    /// Write capability to a PWM output could not be confirmed.
    /// The output is excluded from future bindings, not fatal.
    #[error("PWM output is not writable: {path}")]
    NotWritable { path: PathBuf },

    /// Detection found no tachometer evidence for a PWM output.
    #[error("No fan response detected for {pwm}")]
    NoResponse { pwm: String },

    #[error("Hardware not found: {0}")]
    HardwareNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // ============================================================================
    // Profile and Configuration Errors
    // ============================================================================
    /// A profile reference does not resolve to any inventory entry.
    /// The referencing control is dropped with a log; profile
    /// application otherwise succeeds.
    #[error("Invalid configuration reference '{reference}': {reason}")]
    ConfigInvalid { reference: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Detection Lifecycle Errors
    // ============================================================================
    /// Detection start was rejected because a sweep is already active.
    #[error("A detection sweep is already running")]
    AlreadyRunning,

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl AeroError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-reference error
    pub fn config_invalid(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

// Allow converting from String to AeroError
impl From<String> for AeroError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to AeroError
impl From<&str> for AeroError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
