//! Loading one capture of the process table into the graph.

pub mod cypher;
mod loader;
pub mod query;
mod transport;

pub use loader::{DEFAULT_BATCH_SIZE, LoadOptions, LoadSummary, load_snapshot};
pub use transport::GraphTransport;

use crate::prelude::*;
use chrono::{DateTime, SecondsFormat, Utc};
use sysinfo::System;

/// Identity of one run. Every node and edge written by the run carries its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Capture time in milliseconds since the Unix epoch
    pub id: String,
    /// Capture time as UTC ISO-8601
    pub timestamp: String,
    pub host: String,
    /// Kernel name and release, e.g. `Linux 6.8.0-45-generic`
    pub os: String,
}

impl Snapshot {
    pub fn capture() -> Self {
        let host = System::host_name().unwrap_or_else(|| {
            warn!("Failed to get host name");
            "unknown".to_string()
        });
        Self::at(Utc::now(), host, os_descriptor())
    }

    pub fn at(time: DateTime<Utc>, host: String, os: String) -> Self {
        Self {
            id: time.timestamp_millis().to_string(),
            timestamp: time.to_rfc3339_opts(SecondsFormat::Millis, true),
            host,
            os,
        }
    }
}

/// Name of the running kernel, as reported by `uname -s`.
fn kernel_name() -> &'static str {
    match std::env::consts::OS {
        "linux" | "android" => "Linux",
        "macos" | "ios" => "Darwin",
        "windows" => "Windows_NT",
        "freebsd" => "FreeBSD",
        "openbsd" => "OpenBSD",
        "netbsd" => "NetBSD",
        other => other,
    }
}

fn os_descriptor() -> String {
    match System::kernel_version() {
        Some(release) => format!("{} {release}", kernel_name()),
        None => kernel_name().to_string(),
    }
}
