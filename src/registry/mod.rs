//! Registry collaborator.
//!
//! The registry is the stateful remote service that lists the hosts and
//! waiters to poll and accepts status updates back. [`RegistryClient`] is the
//! port the scheduler and workers talk to; [`http::HttpRegistry`] is the
//! JSON/HTTP implementation used by the binary.

pub mod http;

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PollerError, Result};

pub use http::HttpRegistry;

/// Version values that mean "no version advertised".
const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: u64,
    pub url_short_name: String,
    #[serde(default)]
    pub name: String,
}

/// A host as listed by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: u64,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub ipv4: String,
    #[serde(default)]
    pub ipv6: String,
    pub port: u16,
    /// Version the host advertises; empty or "unknown" when not known
    #[serde(default)]
    pub version: String,
}

impl Host {
    /// Socket address to probe. IPv4 is preferred, IPv6 is used when no IPv4
    /// is advertised.
    pub fn endpoint(&self) -> Result<SocketAddr> {
        let raw = if !self.ipv4.trim().is_empty() {
            self.ipv4.trim()
        } else if !self.ipv6.trim().is_empty() {
            self.ipv6.trim()
        } else {
            return Err(self.invalid("no IPv4 or IPv6 address"));
        };

        let ip: IpAddr = raw
            .parse()
            .map_err(|e| self.invalid(&format!("cannot parse '{}': {}", raw, e)))?;
        if self.port == 0 {
            return Err(self.invalid("port is 0"));
        }
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Version to use for version-aware checks, if any.
    pub fn version_hint(&self) -> Option<&str> {
        let version = self.version.trim();
        if version.is_empty() || version.eq_ignore_ascii_case(UNKNOWN_VERSION) {
            None
        } else {
            Some(version)
        }
    }

    fn invalid(&self, reason: &str) -> PollerError {
        PollerError::InvalidAddress {
            host_id: self.id,
            name: self.display_name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Last status the registry recorded for a host. Also returned as the
/// confirmed status after an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub can_spec: Option<bool>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub p1_profile: Option<String>,
    #[serde(default)]
    pub p2_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HosterStatus {
    pub host: Host,
    #[serde(default)]
    pub status: HostStatus,
}

/// A user waiting for a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiter {
    pub user_id: u64,
    #[serde(default)]
    pub display_name: String,
    pub wait_until: DateTime<Utc>,
}

impl Waiter {
    /// A wait has expired only once `now` is strictly past it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.wait_until < now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiterStatus {
    pub waiter: Waiter,
}

/// Everything the registry currently wants checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedHosts {
    #[serde(default)]
    pub hosts: Vec<HosterStatus>,
    #[serde(default)]
    pub waits: Vec<WaiterStatus>,
}

/// Status report for one host, built from a probe result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub check_date: DateTime<Utc>,
    pub status: String,
    pub hoster_id: u64,
    pub last_check_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_spec: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prof1_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prof2_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_addr: Option<String>,
}

/// Port to the registry. Implementations must be safe to share across the
/// scheduler and every worker; each call is bounded by the client's timeout.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Games the registry knows about.
    async fn games(&self) -> Result<Vec<Game>>;

    /// Hosts to check and waiters to consider for expiry.
    async fn list_hosts(&self, game: &Game) -> Result<ListedHosts>;

    /// Record a host's new status, returning what the registry stored.
    async fn update_host_status(&self, game: &Game, update: &StatusUpdate) -> Result<HostStatus>;

    /// Set a waiter's remaining wait. A zero duration clears the wait.
    async fn expire_wait(
        &self,
        game: &Game,
        user_id: u64,
        duration: Duration,
        reason: &str,
    ) -> Result<()>;
}

/// Bound a registry call by `timeout`. A call that overruns fails with
/// [`PollerError::Registry`].
pub async fn with_deadline<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| PollerError::Registry(format!("no response within {:?}", timeout)))?
}

/// Find `short_name` among the registry's games, waiting at most `timeout`.
pub async fn resolve_game(
    registry: &dyn RegistryClient,
    short_name: &str,
    timeout: Duration,
) -> Result<Game> {
    let games = with_deadline(timeout, registry.games()).await?;
    if let Some(game) = games.iter().find(|g| g.url_short_name == short_name) {
        return Ok(game.clone());
    }
    Err(PollerError::GameNotFound {
        wanted: short_name.to_string(),
        available: games
            .iter()
            .map(|g| g.url_short_name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
