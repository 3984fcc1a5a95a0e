//! Host probing.
//!
//! A probe is a single reachability/compatibility check against a remote
//! host. The wire protocol lives behind the [`Prober`] port; this module only
//! defines what goes in ([`ProbeRequest`]) and what comes back
//! ([`CheckResult`]).
//!
//! - [`CheckDepth`]: how far into the handshake a probe should go
//! - [`Spectate`]: spectator-capability tri-state reported by a host
//! - [`rest::RestProber`]: probe client backed by a remote check daemon

pub mod rest;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::Result;

pub use rest::RestProber;

pub const STATUS_TIMEOUT: &str = "timeout";
pub const STATUS_UNREACHABLE: &str = "unreachable";
pub const STATUS_ERROR: &str = "error";

/// How deep a probe goes before reporting. Ordered shallow to deep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckDepth {
    /// Host answers at all
    Ping,
    /// Host completes the basic handshake
    Basic,
    /// Host accepts a spectator request
    Spectate,
    /// Spectator request reaches the relay behind the host
    SpecRelay,
}

impl CheckDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckDepth::Ping => "ping",
            CheckDepth::Basic => "basic",
            CheckDepth::Spectate => "spectate",
            CheckDepth::SpecRelay => "spec-relay",
        }
    }
}

impl fmt::Display for CheckDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckDepth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ping" => Ok(CheckDepth::Ping),
            "basic" => Ok(CheckDepth::Basic),
            "spectate" | "spec" => Ok(CheckDepth::Spectate),
            "spec-relay" | "spec_relay" | "relay" => Ok(CheckDepth::SpecRelay),
            other => Err(format!(
                "unknown check depth '{}', expected one of: ping, basic, spectate, spec-relay",
                other
            )),
        }
    }
}

/// Whether a host allows spectators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RawSpectate")]
pub enum Spectate {
    Yes,
    No,
    #[default]
    Unknown,
}

impl Spectate {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Spectate::Yes => Some(true),
            Spectate::No => Some(false),
            Spectate::Unknown => None,
        }
    }
}

impl fmt::Display for Spectate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Spectate::Yes => write!(f, "yes"),
            Spectate::No => write!(f, "no"),
            Spectate::Unknown => write!(f, "unknown"),
        }
    }
}

/// Check daemons report spectate either as text or as a raw byte code.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSpectate {
    Code(u8),
    Text(String),
}

impl From<RawSpectate> for Spectate {
    fn from(raw: RawSpectate) -> Self {
        match raw {
            RawSpectate::Code(b'y') => Spectate::Yes,
            RawSpectate::Code(b'n') => Spectate::No,
            RawSpectate::Code(_) => Spectate::Unknown,
            RawSpectate::Text(text) => match text.to_ascii_lowercase().as_str() {
                "y" | "yes" => Spectate::Yes,
                "n" | "no" => Spectate::No,
                _ => Spectate::Unknown,
            },
        }
    }
}

/// Outcome of a single probe.
///
/// Unreachable or slow hosts are reported through `status`, never as an
/// `Err` from [`Prober::probe`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub opponent: Option<String>,
    #[serde(default)]
    pub spectate: Spectate,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub profiles: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub spec_chain: Vec<String>,
    /// Snapshot of the game in progress, if the host disclosed one
    #[serde(default)]
    pub game: Option<serde_json::Value>,
}

/// Check daemons send `null` for lists they have nothing in.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl CheckResult {
    /// Result reported when a probe exceeds its deadline.
    pub fn timed_out(address: &str, timeout: Duration) -> Self {
        Self {
            address: address.to_string(),
            status: STATUS_TIMEOUT.to_string(),
            error: Some(format!("no response within {:?}", timeout)),
            ..Default::default()
        }
    }

    /// True when the probe reached the host.
    pub fn is_good(&self) -> bool {
        let failed = self.status.is_empty()
            || self.status == STATUS_TIMEOUT
            || self.status == STATUS_UNREACHABLE
            || self.status == STATUS_ERROR;
        !failed && self.error.as_deref().map_or(true, str::is_empty)
    }
}

/// Parameters for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub address: String,
    pub depth: CheckDepth,
    /// Version to check compatibility against. `None` means version-agnostic.
    pub version_hint: Option<String>,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn is_version_aware(&self) -> bool {
        self.version_hint.is_some()
    }
}

/// Performs probes against remote hosts. Shared across all workers.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe a host. Returns `Err` only when the probe itself could not be
    /// carried out (e.g. the check service is down).
    async fn probe(&self, request: &ProbeRequest) -> Result<CheckResult>;
}
