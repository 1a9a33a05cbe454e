use crate::device::{Device, DeviceKind};

/// All errors that can occur within the stoat runtime.
///
/// This enum captures every failure mode the engine can detect: bad operator
/// configuration, shape/dtype mismatches, wrong operand counts at an
/// instruction site, unresolvable operator names, invalid stack indices, and
/// allocator exhaustion. Using a single error type across the workspace
/// simplifies error propagation.
///
/// Errors are raised at the point of detection and propagate unmodified
/// through the instruction dispatch loop; the engine performs no local
/// recovery or retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required operator attribute is absent or outside its valid domain
    /// (e.g. a negative axis index).
    #[error("{op}: {message}")]
    Configuration { op: String, message: String },

    /// Rank/extent/dtype mismatch, including a failed broadcast.
    #[error("shape mismatch: {message}")]
    Shape { message: String },

    /// Wrong operand or result count at an instruction site.
    #[error("{op}: expected {expected} operand(s)/result(s), got {got}")]
    Arity {
        op: String,
        expected: usize,
        got: usize,
    },

    /// No kernel registered under this (device-kind, name) key.
    #[error("no operator '{name}' registered for device kind {device}")]
    UnsupportedOperator { device: DeviceKind, name: String },

    /// A stack index did not resolve within `[0, size)` after normalization.
    #[error("stack index {index} out of range for stack of size {size}")]
    OutOfRange { index: i64, size: usize },

    /// Allocator exhaustion on a device. Allocation never partially succeeds.
    #[error("out of memory on {device}: failed to allocate {requested} byte(s)")]
    OutOfMemory { device: Device, requested: usize },

    /// Generic message for boundary errors not covered above
    /// (malformed module, unbound input slot, ...).
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Shape-class error with a formatted description.
    pub fn shape(message: impl Into<String>) -> Self {
        Error::Shape {
            message: message.into(),
        }
    }

    /// Configuration-class error, tagged with the offending operator's name.
    pub fn config(op: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            op: op.into(),
            message: message.into(),
        }
    }
}

/// Convenience Result type used throughout stoat.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("module references data index {}", i)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
