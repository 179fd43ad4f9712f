//! Runtime-supplied invocation parameters
//!
//! The runtime passes the container identity in `CNI_*` environment
//! variables. Orchestrators additionally encode pod metadata in `CNI_ARGS`
//! as `KEY=VALUE` pairs separated by `;`.

use std::net::IpAddr;

use crate::error::CniError;

/// Parameters of a single plugin invocation
#[derive(Debug, Clone, Default)]
pub struct CmdArgs {
    pub container_id: String,
    pub netns: String,
    pub ifname: String,
    /// Raw `CNI_ARGS`
    pub args: String,
    /// Raw `CNI_PATH`, colon-separated plugin directories
    pub path: String,
    /// The configuration document exactly as read from stdin
    pub stdin_data: Vec<u8>,
}

impl CmdArgs {
    /// Read the parameters for `command` from the process environment.
    pub fn from_env(command: &str, stdin_data: Vec<u8>) -> Result<Self, CniError> {
        Self::from_vars(command, stdin_data, |key| std::env::var(key).ok())
    }

    /// Read the parameters for `command` through `lookup`.
    ///
    /// `CNI_CONTAINERID`, `CNI_IFNAME` and `CNI_PATH` are required for every
    /// command, `CNI_NETNS` only for ADD (the namespace may already be gone
    /// when the runtime deletes).
    pub fn from_vars<F>(command: &str, stdin_data: Vec<u8>, lookup: F) -> Result<Self, CniError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CniError::env_error(&format!("{} not set", key)))
        };

        let netns = if command == "ADD" {
            required("CNI_NETNS")?
        } else {
            lookup("CNI_NETNS").unwrap_or_default()
        };

        Ok(Self {
            container_id: required("CNI_CONTAINERID")?,
            netns,
            ifname: required("CNI_IFNAME")?,
            args: lookup("CNI_ARGS").unwrap_or_default(),
            path: required("CNI_PATH")?,
            stdin_data,
        })
    }
}

/// The `CNI_ARGS` keys understood when running under Kubernetes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct K8sArgs {
    pub ignore_unknown: bool,
    pub ip: Option<IpAddr>,
    pub pod_name: String,
    pub pod_namespace: String,
    pub pod_infra_container_id: String,
}

impl K8sArgs {
    /// Parse a raw `CNI_ARGS` string.
    ///
    /// Keys other than the recognized ones are an error unless
    /// `IgnoreUnknown` is set to a true value.
    pub fn parse(raw: &str) -> Result<Self, CniError> {
        let mut parsed = Self::default();
        let mut unknown = Vec::new();
        if raw.is_empty() {
            return Ok(parsed);
        }

        // Every `;`-separated piece must be a pair, a trailing `;` included.
        for pair in raw.split(';') {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) if !v.contains('=') => (k, v),
                _ => {
                    return Err(CniError::env_error(&format!("ARGS: invalid pair {:?}", pair)))
                }
            };

            match key {
                "IgnoreUnknown" => {
                    parsed.ignore_unknown = parse_bool(value).ok_or_else(|| {
                        CniError::env_error(&format!(
                            "ARGS: error parsing value of pair {:?}",
                            pair
                        ))
                    })?;
                }
                "IP" => {
                    let ip = value.parse().map_err(|e: std::net::AddrParseError| {
                        CniError::env_error(&format!(
                            "ARGS: error parsing value of pair {:?}",
                            pair
                        ))
                        .with_details(&e.to_string())
                    })?;
                    parsed.ip = Some(ip);
                }
                "K8S_POD_NAME" => parsed.pod_name = value.to_string(),
                "K8S_POD_NAMESPACE" => parsed.pod_namespace = value.to_string(),
                "K8S_POD_INFRA_CONTAINER_ID" => parsed.pod_infra_container_id = value.to_string(),
                _ => unknown.push(pair.to_string()),
            }
        }

        if !unknown.is_empty() && !parsed.ignore_unknown {
            return Err(CniError::env_error(&format!("ARGS: unknown args {:?}", unknown)));
        }

        Ok(parsed)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}
