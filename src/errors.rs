// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the bridge

use std::fmt;

use crate::device::{DeviceError, StreamId};

/// Result type alias using BridgeError
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Main bridge error type
#[derive(Debug, Clone)]
pub enum BridgeError {
    /// A device call failed (includes the transient busy status)
    Device(DeviceError),
    /// A frame or identifier referenced a stream mapping that has been
    /// invalidated by a use-case switch
    StaleStream(StreamId),
    /// An externally submitted parameter write was rejected before any
    /// device call
    Parameter(ParameterError),
    /// Configuration file errors
    Config(String),
    /// Startup sequence failed; the node never became operational
    Startup(String),
}

/// Validation errors for externally submitted parameter writes
#[derive(Debug, Clone)]
pub enum ParameterError {
    /// Parameter name is not declared
    Unknown(String),
    /// Parameter is declared read-only
    ReadOnly(String),
    /// Value type does not match the declaration
    WrongType(String),
    /// Integer value outside the declared range
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },
    /// Stream index does not exist in the current use case
    NoSuchStream(usize),
    /// One batch requested both an exposure time and an auto-exposure
    /// change for the same stream
    ConflictingBatch(usize),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Device(e) => write!(f, "Device error: {}", e),
            BridgeError::StaleStream(id) => {
                write!(f, "Stream {} is not part of the current use case", id)
            }
            BridgeError::Parameter(e) => write!(f, "Parameter rejected: {}", e),
            BridgeError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BridgeError::Startup(msg) => write!(f, "Startup failed: {}", msg),
        }
    }
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterError::Unknown(name) => write!(f, "unknown parameter '{}'", name),
            ParameterError::ReadOnly(name) => write!(f, "parameter '{}' is read-only", name),
            ParameterError::WrongType(name) => {
                write!(f, "wrong value type for parameter '{}'", name)
            }
            ParameterError::OutOfRange {
                name,
                value,
                min,
                max,
            } => write!(
                f,
                "value {} for '{}' outside range [{}, {}]",
                value, name, min, max
            ),
            ParameterError::NoSuchStream(idx) => {
                write!(f, "stream index {} does not exist", idx)
            }
            ParameterError::ConflictingBatch(idx) => write!(
                f,
                "exposure_time_{idx} and auto_exposure_{idx} must not be set in the same request"
            ),
        }
    }
}

impl std::error::Error for BridgeError {}
impl std::error::Error for ParameterError {}

impl From<DeviceError> for BridgeError {
    fn from(err: DeviceError) -> Self {
        BridgeError::Device(err)
    }
}

impl From<ParameterError> for BridgeError {
    fn from(err: ParameterError) -> Self {
        BridgeError::Parameter(err)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}
