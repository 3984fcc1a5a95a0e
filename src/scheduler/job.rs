use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::probe::{CheckDepth, ProbeRequest};
use crate::registry::{HosterStatus, Waiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    HostCheck,
    WaiterExpiry,
}

/// What the registry last knew about a host, carried along so the update can
/// reference it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousStatus {
    pub hoster_id: u64,
    pub last_check_id: u64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCheckJob {
    /// `ip:port`, IPv6 bracketed
    pub address: String,
    pub version_hint: Option<String>,
    pub depth: CheckDepth,
    pub previous: PreviousStatus,
}

impl HostCheckJob {
    /// Build a check for a listed host. Fails when the host has no usable
    /// address.
    pub fn from_listing(listing: &HosterStatus, depth: CheckDepth) -> Result<Self> {
        let address = listing.host.endpoint()?;
        Ok(Self {
            address: address.to_string(),
            version_hint: listing.host.version_hint().map(str::to_string),
            depth,
            previous: PreviousStatus {
                hoster_id: listing.host.id,
                last_check_id: listing.status.id,
                status: listing.status.status.clone(),
            },
        })
    }

    pub fn probe_request(&self, timeout: Duration) -> ProbeRequest {
        ProbeRequest {
            address: self.address.clone(),
            depth: self.depth,
            version_hint: self.version_hint.clone(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterExpiryJob {
    pub user_id: u64,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Waiter> for WaiterExpiryJob {
    fn from(waiter: &Waiter) -> Self {
        Self {
            user_id: waiter.user_id,
            display_name: waiter.display_name.clone(),
            expires_at: waiter.wait_until,
        }
    }
}

/// One unit of work produced by a scheduler tick and consumed by exactly one
/// worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    HostCheck(HostCheckJob),
    WaiterExpiry(WaiterExpiryJob),
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::HostCheck(_) => JobKind::HostCheck,
            Job::WaiterExpiry(_) => JobKind::WaiterExpiry,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::HostCheck(job) => write!(f, "check {}", job.address),
            Job::WaiterExpiry(job) => {
                write!(f, "expire '{}' ({})", job.display_name, job.user_id)
            }
        }
    }
}
