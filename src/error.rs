//! The crate-wide error taxonomy.
//!
//! One variant per error kind enumerated by the command protocol, plus the
//! two purely-local kinds (`Timeout`, `InvalidName`) that never cross the
//! wire but still need to be reported to a caller.

use thiserror::Error;

/// Offset added to a handler's returned non-zero code before it is placed
/// on the wire, keeping framework error codes and user error codes disjoint.
pub const USER_ERRORS_BEGIN: i64 = 1000;

#[derive(Error, Debug)]
pub enum AtomError {
    #[error("internal error: {0}")]
    InternalError(String),

    #[error("redis error: {0}")]
    RedisError(String),

    #[error("timed out waiting for ACK from {element}")]
    NoAck { element: String },

    #[error("timed out waiting for response from {element}")]
    NoResponse { element: String },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("unsupported command '{cmd}' on element '{element}'")]
    UnsupportedCommand { element: String, cmd: String },

    #[error("callback failed: {0}")]
    CallbackFailed(String),

    #[error("user error {code}: {message}")]
    UserError { code: i64, message: String },

    #[error("timed out waiting for {resource}")]
    Timeout { resource: &'static str },

    #[error("invalid element or stream name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

impl AtomError {
    /// The wire `err_code` for this error, per the response-entry convention
    /// in §3/§7: 0 is reserved for success and is never produced here.
    pub fn wire_code(&self) -> i64 {
        match self {
            AtomError::InternalError(_) => 1,
            AtomError::RedisError(_) => 2,
            AtomError::NoAck { .. } => 3,
            AtomError::NoResponse { .. } => 4,
            AtomError::InvalidCommand(_) => 5,
            AtomError::UnsupportedCommand { .. } => 6,
            AtomError::CallbackFailed(_) => 7,
            AtomError::UserError { code, .. } => *code,
            AtomError::Timeout { .. } => 8,
            AtomError::InvalidName { .. } => 9,
        }
    }

    /// Wraps a handler-returned non-zero user code, applying the
    /// `USER_ERRORS_BEGIN` offset so it cannot collide with a framework code.
    pub fn user(code: i64, message: impl Into<String>) -> Self {
        AtomError::UserError {
            code: USER_ERRORS_BEGIN + code,
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for AtomError {
    fn from(e: redis::RedisError) -> Self {
        AtomError::RedisError(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for AtomError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        AtomError::CallbackFailed(format!("msgpack encode: {e}"))
    }
}

impl From<rmp_serde::decode::Error> for AtomError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        AtomError::CallbackFailed(format!("msgpack decode: {e}"))
    }
}

pub type AtomResult<T> = Result<T, AtomError>;
