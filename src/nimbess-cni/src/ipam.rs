//! IP Address Management (IPAM) delegation
//!
//! Unless the agent allocates addresses itself, the address comes from a
//! regular IPAM plugin binary, executed with the same configuration and
//! environment this plugin received.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::DnsConfig;
use crate::error::{CniError, CniErrorCode};
use crate::result::{ip_version, CniResult, IpConfig, RouteConfig};

/// What an IPAM plugin reserved for the container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationResult {
    pub ips: Vec<IpConfig>,
    pub routes: Vec<RouteConfig>,
    pub dns: DnsConfig,
}

/// Allocates and releases container addresses
#[async_trait]
pub trait Allocator: Send + Sync {
    /// Reserve addresses through the IPAM plugin `plugin`.
    ///
    /// Fails when the plugin reports no IP configuration.
    async fn allocate(&self, plugin: &str, stdin_data: &[u8]) -> Result<AllocationResult, CniError>;

    /// Release whatever `plugin` reserved for this container.
    ///
    /// Safe to call when `allocate` never ran or never completed.
    async fn release(&self, plugin: &str, stdin_data: &[u8]) -> Result<(), CniError>;
}

/// Runs IPAM plugin binaries found in `CNI_PATH`
#[derive(Debug, Clone)]
pub struct ExecAllocator {
    search_path: Vec<PathBuf>,
}

impl ExecAllocator {
    /// Create an allocator searching the colon-separated `cni_path`
    pub fn new(cni_path: &str) -> Self {
        Self {
            search_path: cni_path
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect(),
        }
    }

    /// Locate the plugin binary
    pub fn find_plugin(&self, plugin: &str) -> Result<PathBuf, CniError> {
        if plugin.is_empty() {
            return Err(CniError::ipam_error("no plugin name provided"));
        }
        if self.search_path.is_empty() {
            return Err(CniError::ipam_error("no paths provided"));
        }

        self.search_path
            .iter()
            .map(|dir| dir.join(plugin))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                CniError::ipam_error(&format!(
                    "failed to find plugin {:?} in path {:?}",
                    plugin, self.search_path
                ))
            })
    }

    /// Run `binary` with `CNI_COMMAND=command`, returning its stdout.
    async fn exec(&self, binary: &Path, command: &str, stdin_data: &[u8]) -> Result<Vec<u8>, CniError> {
        let mut child = Command::new(binary)
            .env("CNI_COMMAND", command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                CniError::ipam_error(&format!("failed to execute {}", binary.display()))
                    .with_details(&e.to_string())
            })?;

        // Feed stdin while draining stdout; a plugin may exit without
        // reading its config, and its error document must still be read.
        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(stdin_data).await {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        let output = output.map_err(|e| {
            CniError::io_error("failed to wait for IPAM plugin").with_details(&e.to_string())
        })?;

        if !output.status.success() {
            return Err(plugin_error(binary, &output.stdout));
        }
        written.map_err(|e| {
            CniError::io_error("failed to write IPAM plugin stdin").with_details(&e.to_string())
        })?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl Allocator for ExecAllocator {
    async fn allocate(&self, plugin: &str, stdin_data: &[u8]) -> Result<AllocationResult, CniError> {
        let binary = self.find_plugin(plugin)?;
        let stdout = self.exec(&binary, "ADD", stdin_data).await?;

        let alloc = parse_allocation(&stdout)?;
        tracing::debug!(plugin, ips = alloc.ips.len(), "IPAM allocation done");
        Ok(alloc)
    }

    async fn release(&self, plugin: &str, stdin_data: &[u8]) -> Result<(), CniError> {
        if plugin.is_empty() {
            return Ok(());
        }
        let binary = self.find_plugin(plugin)?;
        self.exec(&binary, "DEL", stdin_data).await?;

        tracing::debug!(plugin, "IPAM release done");
        Ok(())
    }
}

/// Error document a failing plugin prints on stdout
#[derive(Debug, Deserialize)]
struct PluginError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    details: String,
}

fn plugin_error(binary: &Path, stdout: &[u8]) -> CniError {
    match serde_json::from_slice::<PluginError>(stdout) {
        Ok(err) if !err.msg.is_empty() => {
            let details = if err.details.is_empty() {
                format!("{} (code {})", binary.display(), err.code)
            } else {
                format!("{} (code {}): {}", binary.display(), err.code, err.details)
            };
            CniError::ipam_error(&err.msg).with_details(&details)
        }
        _ => CniError::ipam_error(&format!("{} failed", binary.display()))
            .with_details(String::from_utf8_lossy(stdout).trim()),
    }
}

/// IPAM result in the pre-0.3.0 format
#[derive(Debug, Deserialize)]
struct LegacyResult {
    #[serde(default)]
    ip4: Option<LegacyIpConfig>,
    #[serde(default)]
    ip6: Option<LegacyIpConfig>,
    #[serde(default)]
    dns: DnsConfig,
}

#[derive(Debug, Deserialize)]
struct LegacyIpConfig {
    ip: ipnetwork::IpNetwork,
    #[serde(default)]
    gateway: Option<std::net::IpAddr>,
    #[serde(default)]
    routes: Vec<RouteConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    #[serde(default)]
    cni_version: String,
}

/// Decode the result an IPAM plugin printed, in any format it may use.
pub fn parse_allocation(stdout: &[u8]) -> Result<AllocationResult, CniError> {
    let decode_err = |e: serde_json::Error| {
        CniError::new(CniErrorCode::IpamFailure, "failed to decode IPAM result")
            .with_details(&e.to_string())
    };

    let probe: VersionProbe = serde_json::from_slice(stdout).map_err(decode_err)?;
    let legacy =
        probe.cni_version.starts_with("0.1.") || probe.cni_version.starts_with("0.2.");

    let mut alloc = if legacy {
        let result: LegacyResult = serde_json::from_slice(stdout).map_err(decode_err)?;
        let mut alloc = AllocationResult {
            dns: result.dns,
            ..Default::default()
        };
        for ip in [result.ip4, result.ip6].into_iter().flatten() {
            alloc.ips.push(IpConfig {
                version: None,
                address: ip.ip,
                gateway: ip.gateway,
                interface: None,
            });
            alloc.routes.extend(ip.routes);
        }
        alloc
    } else {
        let result: CniResult = serde_json::from_slice(stdout).map_err(decode_err)?;
        AllocationResult {
            ips: result.ips,
            routes: result.routes,
            dns: result.dns,
        }
    };

    for ip in &mut alloc.ips {
        if ip.version.is_none() {
            ip.version = Some(ip_version(&ip.address).to_string());
        }
    }

    if alloc.ips.is_empty() {
        return Err(CniError::ipam_error("IPAM plugin returned missing IP config"));
    }
    Ok(alloc)
}
