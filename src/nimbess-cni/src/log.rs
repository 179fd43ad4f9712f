//! Plugin logging
//!
//! Stdout belongs to the runtime, so diagnostics go to a log file. The
//! subscriber is returned as a [`tracing::Dispatch`] which the caller scopes
//! around the invocation; nothing is installed globally.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use crate::error::CniError;

/// Level used when `logLevel` is not configured
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::DEBUG;

/// Open `path` for appending and build a dispatch writing to it.
pub fn init(path: &Path, level: Option<&str>) -> Result<tracing::Dispatch, CniError> {
    let level = match level {
        None | Some("") => DEFAULT_LOG_LEVEL,
        Some(level) => level.parse::<LevelFilter>().map_err(|e| {
            CniError::config_error(&format!("invalid logLevel {:?}", level))
                .with_details(&e.to_string())
        })?,
    };

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| {
            CniError::io_error(&format!("unable to open log file {}", path.display()))
                .with_details(&e.to_string())
        })?;

    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(level);

    Ok(tracing_subscriber::registry().with(layer).into())
}
