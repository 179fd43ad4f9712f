//! Requests forwarded to the agent

use crate::args::{CmdArgs, K8sArgs};
use crate::config::{DnsConfig, NimbessConfig};
use crate::proto::{cni_reply, cni_request, CniRequest};

/// Build the request attaching the container to the configured network.
pub fn build_add_request(
    conf: &NimbessConfig,
    args: &CmdArgs,
    k8s: &K8sArgs,
    allocation_mode: &str,
) -> CniRequest {
    let nw = &conf.network_config;
    let network_config = cni_request::NetworkConfig {
        cni_version: conf.cni_version.clone(),
        name: nw.name.clone(),
        r#type: nw.network_type.clone(),
        args: nw.args.clone(),
        ip_masq: nw.ip_masq,
        dns: nw.dns.as_ref().map(to_proto_dns),
    };

    CniRequest {
        version: conf.cni_version.clone(),
        container_id: args.container_id.clone(),
        network_namespace: args.netns.clone(),
        interface_name: args.ifname.clone(),
        extra_arguments: network_config.args.clone(),
        network_config: Some(network_config),
        ipam_type: allocation_mode.to_string(),
        pod_name: k8s.pod_name.clone(),
        pod_namespace: k8s.pod_namespace.clone(),
    }
}

/// Build the request detaching the container.
///
/// Only the container interface is identified, the agent knows the rest.
pub fn build_delete_request(conf: &NimbessConfig, args: &CmdArgs) -> CniRequest {
    CniRequest {
        version: conf.cni_version.clone(),
        container_id: args.container_id.clone(),
        network_namespace: args.netns.clone(),
        interface_name: args.ifname.clone(),
        network_config: Some(cni_request::NetworkConfig::default()),
        ..Default::default()
    }
}

fn to_proto_dns(dns: &DnsConfig) -> cni_reply::Dns {
    cni_reply::Dns {
        nameservers: dns.nameservers.clone(),
        domain: dns.domain.clone(),
        search: dns.search.clone(),
        options: dns.options.clone(),
    }
}
