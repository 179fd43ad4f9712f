//! ADD and DEL workflows
//!
//! ADD optionally runs the IPAM plugin, forwards the request to the agent
//! and assembles the result. Once the allocation mode is known, any failure
//! releases the allocation again so addresses don't leak.

use std::time::Instant;

use crate::args::{CmdArgs, K8sArgs};
use crate::config::NimbessConfig;
use crate::error::CniError;
use crate::ipam::Allocator;
use crate::remote::Connector;
use crate::request::{build_add_request, build_delete_request};
use crate::result::CniResult;

/// Forwards CNI requests to the agent
pub struct Plugin<A, C> {
    allocator: A,
    connector: C,
}

impl<A: Allocator, C: Connector> Plugin<A, C> {
    pub fn new(allocator: A, connector: C) -> Self {
        Self {
            allocator,
            connector,
        }
    }

    /// Attach the container, returning the result to print.
    pub async fn add(
        &self,
        conf: &NimbessConfig,
        args: &CmdArgs,
        k8s: &K8sArgs,
    ) -> Result<CniResult, CniError> {
        let start = Instant::now();
        let mode = conf.allocation_mode();
        tracing::debug!(
            container_id = %args.container_id,
            netns = %args.netns,
            ifname = %args.ifname,
            args = %args.args,
            ipam = mode,
            "CNI ADD request"
        );

        let outcome = self.try_add(conf, args, k8s, mode).await;

        match &outcome {
            Ok(result) => {
                tracing::debug!(
                    result = ?result,
                    elapsed = ?start.elapsed(),
                    "CNI ADD request OK"
                );
            }
            Err(err) if conf.delegates_allocation() => {
                tracing::debug!(error = %err, ipam = mode, "CNI ADD failed, releasing IPAM allocation");
                if let Err(release_err) = self.allocator.release(mode, &args.stdin_data).await {
                    tracing::warn!(
                        error = %release_err,
                        details = release_err.details().unwrap_or_default(),
                        ipam = mode,
                        "IPAM release after failed ADD did not succeed"
                    );
                }
            }
            Err(_) => {}
        }

        outcome
    }

    async fn try_add(
        &self,
        conf: &NimbessConfig,
        args: &CmdArgs,
        k8s: &K8sArgs,
        mode: &str,
    ) -> Result<CniResult, CniError> {
        let mut result = if conf.delegates_allocation() {
            let alloc = self.allocator.allocate(mode, &args.stdin_data).await?;
            CniResult::from_allocation(&conf.cni_version, alloc)
        } else {
            CniResult::new(&conf.cni_version)
        };

        let request = build_add_request(conf, args, k8s, mode);

        let mut remote = self.connector.connect(&conf.grpc_server).await?;
        let reply = remote.add(request).await?;
        drop(remote);

        result.merge_reply(&reply)?;
        Ok(result)
    }

    /// Detach the container and release its allocation.
    pub async fn delete(&self, conf: &NimbessConfig, args: &CmdArgs) -> Result<(), CniError> {
        let start = Instant::now();
        tracing::debug!(
            container_id = %args.container_id,
            netns = %args.netns,
            ifname = %args.ifname,
            "CNI DEL request"
        );

        let mut remote = self.connector.connect(&conf.grpc_server).await?;
        remote.delete(build_delete_request(conf, args)).await?;
        drop(remote);

        let mode = conf.allocation_mode();
        if conf.delegates_allocation() && !mode.is_empty() {
            self.allocator.release(mode, &args.stdin_data).await?;
        }

        tracing::debug!(elapsed = ?start.elapsed(), "CNI DEL request OK");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::error::CniErrorCode;
    use crate::ipam::AllocationResult;
    use crate::proto::cni_reply::interface::{ip::Version, Ip};
    use crate::proto::{cni_reply, CniReply, CniRequest};
    use crate::remote::RemoteCni;
    use crate::result::IpConfig;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Allocate(String, Vec<u8>),
        Release(String, Vec<u8>),
        Connect(String),
        Add(CniRequest),
        Delete(CniRequest),
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    struct FakeAllocator {
        log: Log,
        ips: Vec<IpConfig>,
        fail: bool,
        fail_release: bool,
    }

    #[async_trait]
    impl Allocator for FakeAllocator {
        async fn allocate(&self, plugin: &str, stdin_data: &[u8]) -> Result<AllocationResult, CniError> {
            self.log
                .lock()
                .unwrap()
                .push(Call::Allocate(plugin.to_string(), stdin_data.to_vec()));
            if self.fail {
                return Err(CniError::ipam_error("pool exhausted"));
            }
            if self.ips.is_empty() {
                return Err(CniError::ipam_error("IPAM plugin returned missing IP config"));
            }
            Ok(AllocationResult {
                ips: self.ips.clone(),
                ..Default::default()
            })
        }

        async fn release(&self, plugin: &str, stdin_data: &[u8]) -> Result<(), CniError> {
            self.log
                .lock()
                .unwrap()
                .push(Call::Release(plugin.to_string(), stdin_data.to_vec()));
            if self.fail_release {
                return Err(CniError::ipam_error("release failed"));
            }
            Ok(())
        }
    }

    struct FakeConnector {
        log: Log,
        reply: Result<CniReply, CniErrorCode>,
        refuse: bool,
    }

    struct FakeRemote {
        log: Log,
        reply: Result<CniReply, CniErrorCode>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, addr: &str) -> Result<Box<dyn RemoteCni>, CniError> {
            self.log.lock().unwrap().push(Call::Connect(addr.to_string()));
            if self.refuse {
                return Err(CniError::connection_error("connection refused"));
            }
            Ok(Box::new(FakeRemote {
                log: self.log.clone(),
                reply: self.reply.clone(),
            }))
        }
    }

    #[async_trait]
    impl RemoteCni for FakeRemote {
        async fn add(&mut self, request: CniRequest) -> Result<CniReply, CniError> {
            self.log.lock().unwrap().push(Call::Add(request));
            self.reply
                .clone()
                .map_err(|code| CniError::new(code, "remote CNI Add request failed"))
        }

        async fn delete(&mut self, request: CniRequest) -> Result<CniReply, CniError> {
            self.log.lock().unwrap().push(Call::Delete(request));
            self.reply
                .clone()
                .map_err(|code| CniError::new(code, "remote CNI Delete request failed"))
        }
    }

    struct Harness {
        log: Log,
        plugin: Plugin<FakeAllocator, FakeConnector>,
    }

    impl Harness {
        fn new(reply: Result<CniReply, CniErrorCode>) -> Self {
            let log = Log::default();
            let plugin = Plugin::new(
                FakeAllocator {
                    log: log.clone(),
                    ips: vec![IpConfig {
                        version: Some("4".to_string()),
                        address: "10.1.0.9/16".parse().unwrap(),
                        gateway: None,
                        interface: Some(3),
                    }],
                    fail: false,
                    fail_release: false,
                },
                FakeConnector {
                    log: log.clone(),
                    reply,
                    refuse: false,
                },
            );
            Self { log, plugin }
        }

        fn calls(&self) -> Vec<Call> {
            self.log.lock().unwrap().clone()
        }

        fn releases(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::Release(..)))
                .collect()
        }

        fn remote_adds(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Add(_)))
                .count()
        }
    }

    const HOST_LOCAL: &[u8] = br#"{
        "cniVersion": "0.4.0",
        "name": "nimbess-net",
        "type": "nimbess-cni",
        "grpcServer": "/run/cni.sock",
        "ipam": {"type": "host-local", "subnet": "10.1.0.0/16"}
    }"#;

    const SELF_ALLOCATED: &[u8] = br#"{
        "cniVersion": "0.4.0",
        "name": "nimbess-net",
        "type": "nimbess-cni",
        "grpcServer": "localhost:9111",
        "ipamType": "nimbess"
    }"#;

    fn invocation(stdin: &[u8]) -> (NimbessConfig, CmdArgs) {
        let conf = parse_config(stdin).unwrap();
        let args = CmdArgs {
            container_id: "abc123".to_string(),
            netns: "/var/run/netns/abc123".to_string(),
            ifname: "eth0".to_string(),
            args: String::new(),
            path: "/opt/cni/bin".to_string(),
            stdin_data: stdin.to_vec(),
        };
        (conf, args)
    }

    fn good_reply() -> CniReply {
        CniReply {
            interfaces: vec![cni_reply::Interface {
                name: "eth0".to_string(),
                mac: "02:42:0a:00:00:05".to_string(),
                sandbox: "/var/run/netns/abc123".to_string(),
                ip_addresses: vec![Ip {
                    version: Version::Ipv4 as i32,
                    address: "10.0.0.5/24".to_string(),
                    gateway: "10.0.0.1".to_string(),
                }],
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_with_external_ipam() {
        let h = Harness::new(Ok(good_reply()));
        let (conf, args) = invocation(HOST_LOCAL);

        let result = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap();

        assert_eq!(result.cni_version, "0.4.0");
        assert_eq!(result.ips.len(), 2);
        assert_eq!(result.ips[0].address.to_string(), "10.1.0.9/16");
        assert_eq!(result.ips[1].address.to_string(), "10.0.0.5/24");
        assert!(result.ips.iter().all(|ip| ip.interface == Some(0)));
        assert!(h.releases().is_empty());

        let calls = h.calls();
        assert_eq!(calls[0], Call::Allocate("host-local".to_string(), HOST_LOCAL.to_vec()));
        assert_eq!(calls[1], Call::Connect("/run/cni.sock".to_string()));
        match &calls[2] {
            Call::Add(req) => {
                assert_eq!(req.ipam_type, "host-local");
                assert_eq!(req.container_id, "abc123");
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_add_with_self_allocation_skips_ipam() {
        let h = Harness::new(Ok(good_reply()));
        let (conf, args) = invocation(SELF_ALLOCATED);

        let result = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap();

        assert_eq!(result.ips.len(), 1);
        assert_eq!(result.interfaces.len(), 1);
        assert!(!h
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Allocate(..) | Call::Release(..))));
    }

    #[tokio::test]
    async fn test_empty_allocation_never_reaches_agent() {
        let mut h = Harness::new(Ok(good_reply()));
        h.plugin.allocator.ips.clear();
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap_err();

        assert_eq!(err.code(), CniErrorCode::IpamFailure);
        assert_eq!(h.remote_adds(), 0);
        assert!(!h.calls().iter().any(|c| matches!(c, Call::Connect(_))));
    }

    #[tokio::test]
    async fn test_allocator_failure_still_releases() {
        let mut h = Harness::new(Ok(good_reply()));
        h.plugin.allocator.fail = true;
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap_err();

        assert_eq!(err.message(), "pool exhausted");
        assert_eq!(h.remote_adds(), 0);
        assert_eq!(h.releases().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_releases_once() {
        let h = Harness::new(Err(CniErrorCode::RemoteFailure));
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap_err();

        assert_eq!(err.code(), CniErrorCode::RemoteFailure);
        assert_eq!(
            h.releases(),
            vec![Call::Release("host-local".to_string(), HOST_LOCAL.to_vec())]
        );
        // Release runs after the workflow, last.
        assert!(matches!(h.calls().last(), Some(Call::Release(..))));
    }

    #[tokio::test]
    async fn test_connection_failure_releases_once() {
        let mut h = Harness::new(Ok(good_reply()));
        h.plugin.connector.refuse = true;
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap_err();

        assert_eq!(err.code(), CniErrorCode::ConnectionFailed);
        assert_eq!(h.releases().len(), 1);
        assert_eq!(h.remote_adds(), 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_releases_once() {
        let mut reply = good_reply();
        reply.interfaces[0].ip_addresses[0].address = "not-an-ip".to_string();
        let h = Harness::new(Ok(reply));
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap_err();

        assert_eq!(err.code(), CniErrorCode::DecodingFailure);
        assert_eq!(
            h.releases(),
            vec![Call::Release("host-local".to_string(), HOST_LOCAL.to_vec())]
        );
    }

    #[tokio::test]
    async fn test_release_failure_keeps_primary_error() {
        let mut h = Harness::new(Err(CniErrorCode::RemoteFailure));
        h.plugin.allocator.fail_release = true;
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.add(&conf, &args, &K8sArgs::default()).await.unwrap_err();

        assert_eq!(err.code(), CniErrorCode::RemoteFailure);
        assert_eq!(h.releases().len(), 1);
    }

    #[tokio::test]
    async fn test_self_allocation_failure_has_nothing_to_release() {
        let h = Harness::new(Err(CniErrorCode::RemoteFailure));
        let (conf, args) = invocation(SELF_ALLOCATED);

        assert!(h.plugin.add(&conf, &args, &K8sArgs::default()).await.is_err());
        assert!(h.releases().is_empty());
    }

    #[tokio::test]
    async fn test_delete_releases_allocation() {
        let h = Harness::new(Ok(CniReply::default()));
        let (conf, args) = invocation(HOST_LOCAL);

        h.plugin.delete(&conf, &args).await.unwrap();

        let calls = h.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::Connect("/run/cni.sock".to_string()));
        match &calls[1] {
            Call::Delete(req) => {
                assert_eq!(req.container_id, "abc123");
                assert_eq!(req.ipam_type, "");
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert_eq!(
            calls[2],
            Call::Release("host-local".to_string(), HOST_LOCAL.to_vec())
        );
    }

    #[tokio::test]
    async fn test_delete_with_self_allocation() {
        let h = Harness::new(Ok(CniReply::default()));
        let (conf, args) = invocation(SELF_ALLOCATED);

        h.plugin.delete(&conf, &args).await.unwrap();
        assert!(h.releases().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported_without_release() {
        let h = Harness::new(Err(CniErrorCode::RemoteFailure));
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.delete(&conf, &args).await.unwrap_err();
        assert_eq!(err.code(), CniErrorCode::RemoteFailure);
        assert!(h.releases().is_empty());
    }

    #[tokio::test]
    async fn test_delete_release_failure_is_reported() {
        let mut h = Harness::new(Ok(CniReply::default()));
        h.plugin.allocator.fail_release = true;
        let (conf, args) = invocation(HOST_LOCAL);

        let err = h.plugin.delete(&conf, &args).await.unwrap_err();
        assert_eq!(err.code(), CniErrorCode::IpamFailure);
    }
}
