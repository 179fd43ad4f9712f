//! CNI Result types
//!
//! Output formats for CNI operations as defined in CNI Spec 1.0.0, and the
//! translation of the agent's reply into them.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::config::DnsConfig;
use crate::error::CniError;
use crate::ipam::AllocationResult;
use crate::proto::{cni_reply, CniReply};

/// The plugin attaches exactly one interface per container, every address
/// belongs to it.
pub const CONTAINER_INTERFACE_INDEX: usize = 0;

/// Result returned by ADD operation
///
/// See: https://github.com/containernetworking/cni/blob/spec-v1.0.0/SPEC.md#success
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CniResult {
    /// CNI specification version
    #[serde(default)]
    pub cni_version: String,

    /// Interfaces created
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    /// IP addresses assigned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig>,

    /// Routes configured
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteConfig>,

    /// DNS configuration
    #[serde(default)]
    pub dns: DnsConfig,
}

impl CniResult {
    /// Create a new, empty CNI result
    pub fn new(cni_version: &str) -> Self {
        Self {
            cni_version: cni_version.to_string(),
            ..Default::default()
        }
    }

    /// Seed a result with what the IPAM plugin allocated.
    ///
    /// Allocated addresses are re-homed onto the container interface.
    pub fn from_allocation(cni_version: &str, alloc: AllocationResult) -> Self {
        let mut result = Self::new(cni_version);
        for mut ip in alloc.ips {
            ip.interface = Some(CONTAINER_INTERFACE_INDEX);
            result.ips.push(ip);
        }
        result.routes = alloc.routes;
        result.dns = alloc.dns;
        result
    }

    /// Add an interface to the result
    pub fn add_interface(&mut self, name: &str, mac: &str, sandbox: &str) {
        self.interfaces.push(Interface {
            name: name.to_string(),
            mac: mac.to_string(),
            sandbox: (!sandbox.is_empty()).then(|| sandbox.to_string()),
        });
    }

    /// Extend the result with the interfaces, addresses, routes and DNS
    /// programmed by the agent.
    ///
    /// Entries already present are kept. DNS is the exception: every DNS
    /// entry of the reply replaces the whole block, so the last one wins.
    pub fn merge_reply(&mut self, reply: &CniReply) -> Result<(), CniError> {
        for iface in &reply.interfaces {
            self.add_interface(&iface.name, &iface.mac, &iface.sandbox);

            for ip in &iface.ip_addresses {
                self.ips.push(IpConfig::from_reply(ip)?);
            }
        }

        for route in &reply.routes {
            self.routes.push(RouteConfig::from_reply(route)?);
        }

        for dns in &reply.dns {
            self.dns = DnsConfig {
                nameservers: dns.nameservers.clone(),
                domain: dns.domain.clone(),
                search: dns.search.clone(),
                options: dns.options.clone(),
            };
        }

        Ok(())
    }

    /// Serialize the result document printed on stdout
    pub fn to_json(&self) -> Result<String, CniError> {
        serde_json::to_string(self).map_err(|e| {
            CniError::io_error("failed to serialize result").with_details(&e.to_string())
        })
    }
}

/// Network interface information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name
    pub name: String,

    /// MAC address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,

    /// Network namespace path (for container-side interfaces)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// IP address configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpConfig {
    /// "4" or "6"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Host address with the prefix length of its network
    pub address: IpNetwork,

    /// Gateway IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,

    /// Index into interfaces array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,
}

impl IpConfig {
    fn from_reply(ip: &cni_reply::interface::Ip) -> Result<Self, CniError> {
        let address = parse_cidr(&ip.address)?;
        let gateway = if ip.gateway.is_empty() {
            None
        } else {
            Some(parse_ip(&ip.gateway)?)
        };
        // The agent tags the family explicitly; trust the tag over the text.
        let version = if ip.version == cni_reply::interface::ip::Version::Ipv6 as i32 {
            "6"
        } else {
            "4"
        };

        Ok(Self {
            version: Some(version.to_string()),
            address,
            gateway,
            interface: Some(CONTAINER_INTERFACE_INDEX),
        })
    }
}

/// Route configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Destination network
    pub dst: IpNetwork,

    /// Gateway IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<IpAddr>,
}

impl RouteConfig {
    fn from_reply(route: &cni_reply::Route) -> Result<Self, CniError> {
        let dst = network_of(parse_cidr(&route.dst)?)?;
        let gw = if route.gw.is_empty() {
            None
        } else {
            Some(parse_ip(&route.gw)?)
        };
        Ok(Self { dst, gw })
    }
}

/// Result returned by VERSION operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResult {
    /// Current CNI version
    pub cni_version: String,

    /// List of supported CNI versions
    pub supported_versions: Vec<String>,
}

/// "4" or "6", from the address family
pub fn ip_version(addr: &IpNetwork) -> &'static str {
    match addr {
        IpNetwork::V4(_) => "4",
        IpNetwork::V6(_) => "6",
    }
}

/// Parse `addr/prefix`, keeping the host part of the address.
pub fn parse_cidr(s: &str) -> Result<IpNetwork, CniError> {
    // IpNetwork accepts a bare address as a host route; a CIDR is required here.
    if !s.contains('/') {
        return Err(CniError::decode_error(&format!("invalid CIDR address: {}", s)));
    }
    s.parse().map_err(|e: ipnetwork::IpNetworkError| {
        CniError::decode_error(&format!("invalid CIDR address: {}", s)).with_details(&e.to_string())
    })
}

/// Parse a bare IP address.
pub fn parse_ip(s: &str) -> Result<IpAddr, CniError> {
    s.parse().map_err(|e: std::net::AddrParseError| {
        CniError::decode_error(&format!("invalid IP address: {}", s)).with_details(&e.to_string())
    })
}

/// Mask off the host part, `10.1.2.3/16` becomes `10.1.0.0/16`.
fn network_of(net: IpNetwork) -> Result<IpNetwork, CniError> {
    IpNetwork::new(net.network(), net.prefix()).map_err(|e| {
        CniError::decode_error(&format!("invalid network: {}", net)).with_details(&e.to_string())
    })
}
