//! Test harness for poller integration tests.
//!
//! Provides in-memory registry and prober fakes that record every call, plus
//! builders for listings and configs with short timings.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fleet_poller::config::{PollerConfig, RunMode, UpdateMode};
use fleet_poller::diagnostics::Diagnostics;
use fleet_poller::error::{PollerError, Result};
use fleet_poller::probe::{CheckResult, ProbeRequest, Prober, Spectate};
use fleet_poller::registry::{
    Game, Host, HostStatus, HosterStatus, ListedHosts, RegistryClient, StatusUpdate, Waiter,
    WaiterStatus,
};

pub fn soku_game() -> Game {
    Game {
        id: 1,
        url_short_name: "soku".to_string(),
        name: "Hisoutensoku".to_string(),
    }
}

/// Config with short timings for faster tests
pub fn test_config(workers: usize) -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(100),
        timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(1),
        ..PollerConfig::default()
    }
    .with_worker_count(workers)
}

pub fn one_shot(workers: usize, update_mode: UpdateMode) -> PollerConfig {
    test_config(workers)
        .with_run_mode(RunMode::OneShot)
        .with_update_mode(update_mode)
}

pub fn listed_host(id: u64, ipv4: &str, port: u16, version: &str) -> HosterStatus {
    HosterStatus {
        host: Host {
            id,
            display_name: format!("host-{}", id),
            ipv4: ipv4.to_string(),
            ipv6: String::new(),
            port,
            version: version.to_string(),
        },
        status: HostStatus {
            id: id * 100,
            status: "waiting".to_string(),
            ..Default::default()
        },
    }
}

pub fn waiter(user_id: u64, wait_until: DateTime<Utc>) -> WaiterStatus {
    WaiterStatus {
        waiter: Waiter {
            user_id,
            display_name: format!("user-{}", user_id),
            wait_until,
        },
    }
}

/// `count` distinct hosts on consecutive ports
pub fn many_hosts(count: u64) -> ListedHosts {
    ListedHosts {
        hosts: (1..=count)
            .map(|i| listed_host(i, "10.0.0.1", 10_000 + i as u16, "1.10a"))
            .collect(),
        waits: Vec::new(),
    }
}

/// Registry fake that serves scripted listings and records every mutation.
pub struct FakeRegistry {
    games: Vec<Game>,
    scripted: Mutex<VecDeque<std::result::Result<ListedHosts, String>>>,
    fallback: ListedHosts,
    list_calls: AtomicUsize,
    updates: Mutex<Vec<StatusUpdate>>,
    expiries: Mutex<Vec<(u64, Duration, String)>>,
    fail_mutations: AtomicBool,
    hang_listing: AtomicBool,
}

impl FakeRegistry {
    pub fn new(listing: ListedHosts) -> Self {
        Self {
            games: vec![soku_game()],
            scripted: Mutex::new(VecDeque::new()),
            fallback: listing,
            list_calls: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            expiries: Mutex::new(Vec::new()),
            fail_mutations: AtomicBool::new(false),
            hang_listing: AtomicBool::new(false),
        }
    }

    pub fn with_games(mut self, games: Vec<Game>) -> Self {
        self.games = games;
        self
    }

    /// Serve `result` for the next listing before falling back to the default
    pub fn script(self, result: std::result::Result<ListedHosts, String>) -> Self {
        self.scripted.lock().unwrap().push_back(result);
        self
    }

    /// Listing calls never answer
    pub fn hang_listing(self) -> Self {
        self.hang_listing.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_mutations(self) -> Self {
        self.fail_mutations.store(true, Ordering::SeqCst);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn expiries(&self) -> Vec<(u64, Duration, String)> {
        self.expiries.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> usize {
        self.updates.lock().unwrap().len() + self.expiries.lock().unwrap().len()
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn games(&self) -> Result<Vec<Game>> {
        Ok(self.games.clone())
    }

    async fn list_hosts(&self, _game: &Game) -> Result<ListedHosts> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_listing.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(listing)) => Ok(listing),
            Some(Err(msg)) => Err(PollerError::Registry(msg)),
            None => Ok(self.fallback.clone()),
        }
    }

    async fn update_host_status(&self, _game: &Game, update: &StatusUpdate) -> Result<HostStatus> {
        self.updates.lock().unwrap().push(update.clone());
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(PollerError::Registry("update rejected".to_string()));
        }
        Ok(HostStatus {
            id: update.last_check_id + 1,
            status: update.status.clone(),
            can_spec: update.can_spec,
            version: update.new_version.clone(),
            p1_profile: update.prof1_name.clone(),
            p2_profile: update.prof2_name.clone(),
        })
    }

    async fn expire_wait(
        &self,
        _game: &Game,
        user_id: u64,
        duration: Duration,
        reason: &str,
    ) -> Result<()> {
        self.expiries
            .lock()
            .unwrap()
            .push((user_id, duration, reason.to_string()));
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(PollerError::Registry("expiry rejected".to_string()));
        }
        Ok(())
    }
}

/// Prober fake with a fixed delay that tracks concurrency.
pub struct FakeProber {
    delay: Duration,
    results: Mutex<HashMap<String, CheckResult>>,
    failing: Mutex<Vec<String>>,
    requests: Mutex<Vec<ProbeRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProber {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            results: Mutex::new(HashMap::new()),
            failing: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_result(self, address: &str, result: CheckResult) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(address.to_string(), result);
        self
    }

    /// Probes of `address` fail at the transport level
    pub fn failing_on(self, address: &str) -> Self {
        self.failing.lock().unwrap().push(address.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ProbeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_for(&self, address: &str) -> Option<ProbeRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.address == address)
            .cloned()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, request: &ProbeRequest) -> Result<CheckResult> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&request.address) {
            return Err(PollerError::Probe(format!(
                "check service unavailable for {}",
                request.address
            )));
        }

        let scripted = self.results.lock().unwrap().get(&request.address).cloned();
        Ok(scripted.unwrap_or_else(|| CheckResult {
            address: request.address.clone(),
            status: "waiting".to_string(),
            version: request.version_hint.clone(),
            spectate: Spectate::Yes,
            ..Default::default()
        }))
    }
}

/// Diagnostics port that only counts dumps.
#[derive(Default)]
pub struct CountingDiagnostics {
    dumps: AtomicUsize,
}

impl CountingDiagnostics {
    pub fn dumps(&self) -> usize {
        self.dumps.load(Ordering::SeqCst)
    }
}

impl Diagnostics for CountingDiagnostics {
    fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        self.dumps.fetch_add(1, Ordering::SeqCst);
        writeln!(out, "test diagnostics dump")
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}

/// Poll `condition` until it holds or `timeout_duration` elapses
pub async fn wait_for<F, Fut>(condition: F, timeout_duration: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Assert a condition eventually becomes true
pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration).await;
    assert!(result, "{}", message);
}
