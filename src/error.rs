//! # Error Types Module
//!
//! Centralized error handling for sensor-log.
//! Every failure in a recording session narrows to one of these types, gets
//! rendered into the status message, and leaves the controller Idle and usable.
//!
//! ## Error Types
//! - `PreconditionError`: a session could not be started
//! - `SourceError`: the event source reported a fault mid-session
//! - `ExportError`: the finished session could not be written to disk
//! - `SessionError`: what callers of `SessionHandle` see
//! - `ConfigError`: configuration file I/O and parsing errors

use crate::sample::SensorKind;
use std::fmt;
use std::path::PathBuf;

/// Reasons `start()` refuses to begin a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// The sensor hardware is missing or not usable right now
    CapabilityUnavailable(SensorKind),
    /// The user has not granted access to the sensor
    PermissionDenied(SensorKind),
    /// A session is already recording
    AlreadyRecording,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionError::CapabilityUnavailable(kind) => {
                write!(f, "{} sensor is not available on this device", kind.label())
            }
            PreconditionError::PermissionDenied(kind) => {
                write!(f, "{} access has not been granted", kind.label())
            }
            PreconditionError::AlreadyRecording => {
                write!(f, "A recording is already in progress")
            }
        }
    }
}

impl std::error::Error for PreconditionError {}

/// Faults reported by an event source while it is producing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source lost access to its hardware
    Unavailable,
    /// Any other platform-reported failure
    Failed(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Unavailable => write!(f, "Sensor became unavailable"),
            SourceError::Failed(msg) => write!(f, "Sensor failure: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// Errors that can occur while writing a finished session
#[derive(Debug)]
pub enum ExportError {
    /// Nothing to write
    EmptySession,
    /// Neither a configured nor a platform documents directory could be resolved
    OutputDirUnavailable,
    /// Creating, writing or committing the file failed
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::EmptySession => write!(f, "No samples to export"),
            ExportError::OutputDirUnavailable => {
                write!(f, "Could not find a directory to save recordings in")
            }
            ExportError::Write { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors returned by `SessionHandle` operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The request was rejected; the controller stays Idle
    Precondition(PreconditionError),
    /// The controller task has shut down
    ControllerClosed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Precondition(e) => write!(f, "{}", e),
            SessionError::ControllerClosed => write!(f, "Session controller is not running"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Precondition(e) => Some(e),
            SessionError::ControllerClosed => None,
        }
    }
}

impl From<PreconditionError> for SessionError {
    fn from(e: PreconditionError) -> Self {
        SessionError::Precondition(e)
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}
