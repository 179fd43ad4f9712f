//! Connection to the Nimbess agent
//!
//! The agent listens either on a TCP `host:port` or on a unix socket. The
//! channel is plaintext: the agent runs on the same host.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};

use crate::error::CniError;
use crate::proto::remote_cni_client::RemoteCniClient;
use crate::proto::{CniReply, CniRequest};

/// Bound on establishing the connection
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the agent listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `host:port`
    Tcp(String),
    /// Unix socket path
    Unix(PathBuf),
}

impl Target {
    /// Addresses starting with `/` are unix socket paths, anything else is
    /// `host:port`.
    pub fn parse(addr: &str) -> Self {
        if addr.starts_with('/') {
            Target::Unix(PathBuf::from(addr))
        } else {
            Target::Tcp(addr.to_string())
        }
    }
}

/// The operations the agent serves
#[async_trait]
pub trait RemoteCni: Send {
    async fn add(&mut self, request: CniRequest) -> Result<CniReply, CniError>;
    async fn delete(&mut self, request: CniRequest) -> Result<CniReply, CniError>;
}

/// Opens connections to the agent
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial `addr`. The connection lives as long as the returned client.
    async fn connect(&self, addr: &str) -> Result<Box<dyn RemoteCni>, CniError>;
}

/// Dials the agent over gRPC
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    dial_timeout: Duration,
    call_timeout: Option<Duration>,
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self {
            dial_timeout: DIAL_TIMEOUT,
            call_timeout: None,
        }
    }
}

impl GrpcConnector {
    /// Bound each remote call by `timeout`
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Bound dialing by `timeout`
    #[cfg(test)]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    async fn dial(&self, target: &Target) -> Result<Channel, tonic::transport::Error> {
        match target {
            Target::Tcp(addr) => {
                Endpoint::from_shared(format!("http://{}", addr))?
                    .connect_timeout(self.dial_timeout)
                    .connect()
                    .await
            }
            Target::Unix(path) => {
                let path = path.clone();
                let timeout = self.dial_timeout;
                // The URI is required by the endpoint but never dialed.
                Endpoint::from_static("http://[::]:50051")
                    .connect_with_connector(tower::service_fn(move |_: Uri| {
                        let path = path.clone();
                        async move {
                            let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
                                .await
                                .map_err(|_| {
                                    std::io::Error::new(
                                        std::io::ErrorKind::TimedOut,
                                        "unix socket dial timed out",
                                    )
                                })??;
                            Ok::<_, std::io::Error>(TokioIo::new(stream))
                        }
                    }))
                    .await
            }
        }
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, addr: &str) -> Result<Box<dyn RemoteCni>, CniError> {
        let target = Target::parse(addr);
        tracing::debug!(?target, "connecting to gRPC server");

        let channel = self.dial(&target).await.map_err(|e| {
            tracing::error!(server = addr, error = %e, "unable to connect to gRPC server");
            CniError::connection_error(&format!("unable to connect to gRPC server {}", addr))
                .with_details(&e.to_string())
        })?;

        Ok(Box::new(GrpcRemote {
            client: RemoteCniClient::new(channel),
            call_timeout: self.call_timeout,
        }))
    }
}

/// [`RemoteCni`] over a dialed gRPC channel
struct GrpcRemote {
    client: RemoteCniClient<Channel>,
    call_timeout: Option<Duration>,
}

impl GrpcRemote {
    fn request(&self, request: CniRequest) -> tonic::Request<CniRequest> {
        let mut request = tonic::Request::new(request);
        if let Some(timeout) = self.call_timeout {
            request.set_timeout(timeout);
        }
        request
    }
}

#[async_trait]
impl RemoteCni for GrpcRemote {
    async fn add(&mut self, request: CniRequest) -> Result<CniReply, CniError> {
        let request = self.request(request);
        let response = bounded(self.call_timeout, self.client.add(request)).await;
        check_reply("Add", response)
    }

    async fn delete(&mut self, request: CniRequest) -> Result<CniReply, CniError> {
        let request = self.request(request);
        let response = bounded(self.call_timeout, self.client.delete(request)).await;
        check_reply("Delete", response)
    }
}

async fn bounded<F>(
    timeout: Option<Duration>,
    call: F,
) -> Result<tonic::Response<CniReply>, tonic::Status>
where
    F: std::future::Future<Output = Result<tonic::Response<CniReply>, tonic::Status>>,
{
    match timeout {
        None => call.await,
        Some(timeout) => tokio::time::timeout(timeout, call)
            .await
            .unwrap_or_else(|_| Err(tonic::Status::deadline_exceeded("remote CNI request timed out"))),
    }
}

/// Map transport failures and application-level failures to errors.
pub fn check_reply(
    op: &str,
    response: Result<tonic::Response<CniReply>, tonic::Status>,
) -> Result<CniReply, CniError> {
    let reply = match response {
        Ok(response) => response.into_inner(),
        Err(status) => {
            tracing::error!(
                op,
                code = ?status.code(),
                status = status.message(),
                "error executing remote CNI request"
            );
            return Err(
                CniError::remote_error(&format!("remote CNI {} request failed", op))
                    .with_details(&format!("{:?}: {}", status.code(), status.message())),
            );
        }
    };

    if reply.result != 0 {
        tracing::error!(op, result = reply.result, error = %reply.error, "remote CNI request rejected");
        let msg = if reply.error.is_empty() {
            format!("remote CNI {} request failed with result {}", op, reply.result)
        } else {
            reply.error.clone()
        };
        return Err(CniError::remote_error(&msg));
    }

    Ok(reply)
}
