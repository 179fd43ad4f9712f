//! CNI Error types
//!
//! Error codes and types as defined in CNI Spec 1.0.0, plus the
//! plugin-specific codes used when forwarding requests to the agent.

use serde::Serialize;
use thiserror::Error;

/// CNI error codes as defined in the specification
///
/// See: https://github.com/containernetworking/cni/blob/spec-v1.0.0/SPEC.md#error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CniErrorCode {
    /// 1: Incompatible CNI version
    IncompatibleVersion = 1,

    /// 2: Unsupported field in network configuration
    UnsupportedField = 2,

    /// 4: Invalid necessary environment variables
    InvalidEnvironmentVariables = 4,

    /// 5: I/O failure
    IoFailure = 5,

    /// 6: Failed to decode content
    DecodingFailure = 6,

    /// 7: Invalid network config
    InvalidNetworkConfig = 7,

    // Plugin-specific errors (100+)

    /// 100: Could not dial the agent
    ConnectionFailed = 100,

    /// 101: The agent rejected or failed the request
    RemoteFailure = 101,

    /// 102: IPAM failure
    IpamFailure = 102,
}

/// CNI error with code, message, and optional details
#[derive(Debug, Error)]
#[error("{msg}")]
pub struct CniError {
    code: CniErrorCode,
    msg: String,
    details: Option<String>,
}

impl CniError {
    /// Create a new CNI error
    pub fn new(code: CniErrorCode, msg: &str) -> Self {
        Self {
            code,
            msg: msg.to_string(),
            details: None,
        }
    }

    /// Add details to the error
    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }

    /// Get the error code
    pub fn code(&self) -> CniErrorCode {
        self.code
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Get the error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Render the error as the document the runtime reads from stdout.
    pub fn to_document<'a>(&'a self, cni_version: &'a str) -> ErrorDocument<'a> {
        ErrorDocument {
            cni_version,
            code: self.code as u32,
            msg: &self.msg,
            details: self.details.as_deref(),
        }
    }
}

/// Wire form of a [`CniError`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDocument<'a> {
    pub cni_version: &'a str,
    pub code: u32,
    pub msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a str>,
}

// Convenience constructors for common errors

impl CniError {
    /// Create an IO error
    pub fn io_error(msg: &str) -> Self {
        Self::new(CniErrorCode::IoFailure, msg)
    }

    /// Create a decoding error
    pub fn decode_error(msg: &str) -> Self {
        Self::new(CniErrorCode::DecodingFailure, msg)
    }

    /// Create an invalid config error
    pub fn config_error(msg: &str) -> Self {
        Self::new(CniErrorCode::InvalidNetworkConfig, msg)
    }

    /// Create an invalid environment error
    pub fn env_error(msg: &str) -> Self {
        Self::new(CniErrorCode::InvalidEnvironmentVariables, msg)
    }

    /// Create a dial error
    pub fn connection_error(msg: &str) -> Self {
        Self::new(CniErrorCode::ConnectionFailed, msg)
    }

    /// Create an agent-side error
    pub fn remote_error(msg: &str) -> Self {
        Self::new(CniErrorCode::RemoteFailure, msg)
    }

    /// Create an IPAM error
    pub fn ipam_error(msg: &str) -> Self {
        Self::new(CniErrorCode::IpamFailure, msg)
    }
}
