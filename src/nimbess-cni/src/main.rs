//! Nimbess CNI Plugin
//!
//! A CNI plugin that forwards ADD and DEL requests to the Nimbess agent
//! over gRPC, optionally delegating address allocation to an IPAM plugin.

mod args;
mod config;
mod error;
mod ipam;
mod log;
mod plugin;
mod proto;
mod remote;
mod request;
mod result;

use std::env;
use std::io::{self, Read};

use args::{CmdArgs, K8sArgs};
use config::{parse_config, NimbessConfig, SUPPORTED_VERSIONS};
use error::{CniError, CniErrorCode};
use ipam::ExecAllocator;
use plugin::Plugin;
use remote::GrpcConnector;
use result::VersionResult;

/// Maximum size of network config input (1 MB should be more than enough)
const MAX_INPUT_SIZE: u64 = 1024 * 1024;

/// CNI Spec version reported when the configuration doesn't name one
const CNI_VERSION: &str = "1.0.0";

fn main() {
    // Invoked by hand rather than by a runtime: say what we are and stop.
    let command = match env::var("CNI_COMMAND") {
        Ok(command) if !command.is_empty() => command,
        _ => {
            eprintln!("{}", about());
            return;
        }
    };

    let mut input = Vec::new();
    let outcome = read_stdin(&mut input).and_then(|()| run(&command, &input));

    if let Err(e) = outcome {
        // Errors go to stdout as a single JSON document, per the CNI contract
        let version = reported_version(&input);
        let document = e.to_document(&version);
        println!(
            "{}",
            serde_json::to_string(&document).unwrap_or_else(|_| {
                format!(
                    r#"{{"cniVersion":"{}","code":{},"msg":"{}"}}"#,
                    version,
                    e.code() as u32,
                    e.message().replace('"', "'")
                )
            })
        );
        std::process::exit(1);
    }
}

fn read_stdin(input: &mut Vec<u8>) -> Result<(), CniError> {
    io::stdin()
        .take(MAX_INPUT_SIZE)
        .read_to_end(input)
        .map_err(|e| CniError::io_error("failed to read stdin").with_details(&e.to_string()))?;
    Ok(())
}

/// The configuration's version when readable, else [`CNI_VERSION`]
fn reported_version(input: &[u8]) -> String {
    serde_json::from_slice::<NimbessConfig>(input)
        .ok()
        .map(|conf| conf.cni_version)
        .filter(|version| !version.is_empty())
        .unwrap_or_else(|| CNI_VERSION.to_string())
}

/// Banner printed when run without `CNI_COMMAND`
fn about() -> String {
    format!("CNI plugin nimbess-cni v{}", env!("CARGO_PKG_VERSION"))
}

fn run(command: &str, input: &[u8]) -> Result<(), CniError> {
    match command {
        "ADD" | "DEL" => cmd_forward(command, input),
        "CHECK" => Ok(()),
        "VERSION" => cmd_version(),
        _ => {
            // Truncate command for safety in error message (avoid log injection)
            let safe_command: String = command
                .chars()
                .take(32)
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .collect();
            Err(CniError::new(
                CniErrorCode::InvalidEnvironmentVariables,
                &format!("unknown CNI_COMMAND: {}", safe_command),
            ))
        }
    }
}

/// Handle ADD and DEL, both forwarded to the agent
fn cmd_forward(command: &str, input: &[u8]) -> Result<(), CniError> {
    let conf = parse_config(input)?;
    conf.check_version()?;

    let dispatch = log::init(conf.log_file(), conf.log_level.as_deref())?;
    tracing::dispatcher::with_default(&dispatch, || {
        let outcome = forward(command, &conf, input);
        if let Err(e) = &outcome {
            tracing::error!(
                command,
                code = e.code() as u32,
                error = %e,
                details = e.details().unwrap_or_default(),
                "CNI request failed"
            );
        }
        outcome
    })
}

fn forward(command: &str, conf: &NimbessConfig, input: &[u8]) -> Result<(), CniError> {
    let args = CmdArgs::from_env(command, input.to_vec())?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            CniError::io_error("failed to create tokio runtime").with_details(&e.to_string())
        })?;

    let plugin = Plugin::new(
        ExecAllocator::new(&args.path),
        GrpcConnector::default().with_call_timeout(conf.grpc_timeout),
    );

    if command == "ADD" {
        let k8s = K8sArgs::parse(&args.args)?;
        let result = runtime.block_on(plugin.add(conf, &args, &k8s))?;
        println!("{}", result.to_json()?);
    } else {
        // DEL outputs nothing on success
        runtime.block_on(plugin.delete(conf, &args))?;
    }

    Ok(())
}

/// Handle VERSION command - report supported CNI versions
fn cmd_version() -> Result<(), CniError> {
    let result = VersionResult {
        cni_version: CNI_VERSION.to_string(),
        supported_versions: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
    };

    println!(
        "{}",
        serde_json::to_string(&result).map_err(|e| {
            CniError::new(CniErrorCode::IoFailure, "failed to serialize version")
                .with_details(&e.to_string())
        })?
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_version() {
        assert_eq!(reported_version(br#"{"cniVersion": "0.4.0"}"#), "0.4.0");
        assert_eq!(reported_version(br#"{"name": "net"}"#), CNI_VERSION);
        assert_eq!(reported_version(b"not json"), CNI_VERSION);
        assert_eq!(reported_version(b""), CNI_VERSION);
    }

    #[test]
    fn test_about_names_plugin_and_version() {
        let banner = about();
        assert!(banner.starts_with("CNI plugin nimbess-cni"));
        assert!(banner.ends_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unknown_command_is_sanitized() {
        let err = run("ADD\n; rm -rf /", b"{}").unwrap_err();
        assert_eq!(err.code(), CniErrorCode::InvalidEnvironmentVariables);
        assert_eq!(err.message(), "unknown CNI_COMMAND: ADDrm-rf");
    }
}
