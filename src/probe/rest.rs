use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::config::CheckServiceConfig;
use crate::error::{PollerError, Result};
use crate::probe::{CheckResult, ProbeRequest, Prober};

#[derive(Debug, Deserialize)]
struct CheckResponse {
    result: CheckResult,
}

/// Prober that hands each check to a remote check daemon over HTTP.
///
/// The daemon exposes `GET /check/{address}?level=<depth>[&version=<hint>]`
/// and answers with `{ "request", "hostport", "result" }`. The per-request
/// deadline comes from the [`ProbeRequest`]; hitting it yields a `timeout`
/// result rather than an error.
#[derive(Debug, Clone)]
pub struct RestProber {
    client: Client,
    base: Url,
}

impl RestProber {
    pub fn new(config: &CheckServiceConfig) -> Result<Self> {
        let base = Url::parse(&config.uri).map_err(|e| {
            PollerError::Probe(format!("invalid check service uri '{}': {}", config.uri, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(PollerError::Probe(format!(
                "check service uri '{}' cannot be used as a base",
                config.uri
            )));
        }
        let client = Client::builder()
            .user_agent(concat!("fleet-poller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    fn check_url(&self, request: &ProbeRequest) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PollerError::Internal(format!("base uri {} has no path", self.base)))?
            .pop_if_empty()
            .push("check")
            .push(&request.address);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("level", request.depth.as_str());
            if let Some(version) = &request.version_hint {
                query.append_pair("version", version);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Prober for RestProber {
    async fn probe(&self, request: &ProbeRequest) -> Result<CheckResult> {
        let url = self.check_url(request)?;
        let response = match self
            .client
            .get(url)
            .timeout(request.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(CheckResult::timed_out(&request.address, request.timeout))
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PollerError::Probe(format!(
                "check service answered {} for {}: {}",
                status,
                request.address,
                body.trim()
            )));
        }

        match response.json::<CheckResponse>().await {
            Ok(body) => Ok(body.result),
            Err(e) if e.is_timeout() => {
                Ok(CheckResult::timed_out(&request.address, request.timeout))
            }
            Err(e) => Err(e.into()),
        }
    }
}
