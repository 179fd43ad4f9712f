//! CNI Network Configuration parsing
//!
//! Handles parsing of the network configuration JSON passed via stdin.
//! Besides the standard CNI keys the document carries the location of the
//! Nimbess agent (`grpcServer`) and the network block forwarded to it.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CniError, CniErrorCode};

/// Log file used when `logFile` is not configured
pub const DEFAULT_LOG_FILE: &str = "/var/log/nimbess/nimbess-cni.log";

/// Allocation mode meaning the agent assigns addresses itself
pub const SELF_ALLOCATION: &str = "nimbess";

/// CNI versions whose result format this plugin produces
pub const SUPPORTED_VERSIONS: &[&str] = &["0.3.0", "0.3.1", "0.4.0", "1.0.0"];

/// Plugin configuration passed to the CNI plugin
///
/// See: https://github.com/containernetworking/cni/blob/spec-v1.0.0/SPEC.md#network-configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NimbessConfig {
    /// CNI specification version
    #[serde(default)]
    pub cni_version: String,

    /// Network name (must be unique on the host)
    #[serde(default)]
    pub name: String,

    /// CNI plugin type (matches binary name)
    #[serde(default, rename = "type")]
    pub plugin_type: String,

    /// Standard IPAM block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<IpamConfig>,

    /// Standard DNS block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfig>,

    /// Previous result from chain. Must be absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_result: Option<serde_json::Value>,

    // Nimbess-specific configuration

    /// Agent address, `host:port` (e.g. "localhost:9111") or a unix socket
    /// path (e.g. "/run/cni.sock")
    #[serde(default)]
    pub grpc_server: String,

    /// Deadline for the remote call (e.g. "10s"). No deadline when absent.
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub grpc_timeout: Option<Duration>,

    /// Plugin log file, defaults to [`DEFAULT_LOG_FILE`]
    #[serde(default)]
    pub log_file: String,

    /// Log verbosity, defaults to "debug"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Comma-separated ETCD endpoints, consumed by some IPAM plugins
    #[serde(default)]
    pub etcd_endpoints: String,

    /// Network forwarded to the agent
    #[serde(default)]
    pub network_config: NetworkConfig,

    /// Allocation mode, used when `ipam.type` is not set
    #[serde(default)]
    pub ipam_type: String,
}

impl NimbessConfig {
    /// Get the log file path, defaulting to [`DEFAULT_LOG_FILE`]
    pub fn log_file(&self) -> &Path {
        if self.log_file.is_empty() {
            Path::new(DEFAULT_LOG_FILE)
        } else {
            Path::new(&self.log_file)
        }
    }

    /// Resolve the allocation mode: `ipam.type` wins over `ipamType`.
    pub fn allocation_mode(&self) -> &str {
        match &self.ipam {
            Some(ipam) if !ipam.plugin_type.is_empty() => &ipam.plugin_type,
            _ => &self.ipam_type,
        }
    }

    /// Whether addresses come from an external IPAM plugin
    pub fn delegates_allocation(&self) -> bool {
        self.allocation_mode() != SELF_ALLOCATION
    }

    /// Reject versions whose result format we can't produce.
    pub fn check_version(&self) -> Result<(), CniError> {
        if self.cni_version.is_empty() || SUPPORTED_VERSIONS.contains(&self.cni_version.as_str())
        {
            return Ok(());
        }
        Err(CniError::new(
            CniErrorCode::IncompatibleVersion,
            &format!("incompatible CNI version {}", self.cni_version),
        )
        .with_details(&format!("supported versions: {}", SUPPORTED_VERSIONS.join(", "))))
    }
}

/// Network to which the container is joined, forwarded verbatim to the agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Network name
    #[serde(default)]
    pub name: String,

    /// Network type
    #[serde(default, rename = "type")]
    pub network_type: String,

    /// Additional dictionary arguments
    #[serde(default, rename = "Args", alias = "args")]
    pub args: HashMap<String, String>,

    /// Enable IP masquerading
    #[serde(default)]
    pub ip_masq: bool,

    /// DNS configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfig>,
}

/// IPAM (IP Address Management) configuration
///
/// Only the plugin type is interpreted, the rest belongs to the IPAM plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpamConfig {
    /// IPAM plugin type (e.g., "host-local")
    #[serde(default, rename = "type")]
    pub plugin_type: String,

    #[serde(flatten)]
    pub specific: HashMap<String, serde_json::Value>,
}

/// DNS configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// DNS nameserver IPs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,

    /// DNS domain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    /// DNS search domains
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,

    /// DNS options
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Parse and validate the plugin configuration.
pub fn parse_config(bytes: &[u8]) -> Result<NimbessConfig, CniError> {
    let conf: NimbessConfig = serde_json::from_slice(bytes).map_err(|e| {
        CniError::decode_error(&format!("failed to load plugin config: {}", e))
    })?;

    if conf.prev_result.is_some() {
        return Err(CniError::new(
            CniErrorCode::UnsupportedField,
            "CNI chaining is not supported by this plugin",
        ));
    }

    if conf.grpc_server.is_empty() {
        return Err(CniError::config_error(
            r#""grpcServer" field is required. It specifies where the CNI requests should be forwarded to"#,
        ));
    }

    Ok(conf)
}
