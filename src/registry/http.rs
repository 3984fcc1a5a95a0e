use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::RegistryConfig;
use crate::error::{PollerError, Result};
use crate::registry::{Game, HostStatus, ListedHosts, RegistryClient, StatusUpdate};

#[derive(Serialize)]
struct ExpireWaitRequest<'a> {
    duration_secs: u64,
    reason: &'a str,
}

/// Registry client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let base = Url::parse(&config.uri).map_err(|e| {
            PollerError::Registry(format!("invalid registry uri '{}': {}", config.uri, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(PollerError::Registry(format!(
                "registry uri '{}' cannot be used as a base",
                config.uri
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("fleet-poller/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base,
            token: config.token.clone(),
        })
    }

    /// Human readable target for startup logs.
    pub fn info(&self) -> String {
        match self.token {
            Some(_) => format!("{} (authenticated)", self.base),
            None => format!("{} (anonymous)", self.base),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| PollerError::Internal(format!("base uri {} has no path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        Err(PollerError::Registry(format!(
            "{} returned {}: {}",
            url,
            status,
            body.trim()
        )))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.send(request).await?.json::<T>().await?)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn games(&self) -> Result<Vec<Game>> {
        let url = self.url(&["games"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn list_hosts(&self, game: &Game) -> Result<ListedHosts> {
        let url = self.url(&["games", game.url_short_name.as_str(), "hosts", "check"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn update_host_status(&self, game: &Game, update: &StatusUpdate) -> Result<HostStatus> {
        let url = self.url(&["games", game.url_short_name.as_str(), "hosts", "status"])?;
        self.send_json(self.client.post(url).json(update)).await
    }

    async fn expire_wait(
        &self,
        game: &Game,
        user_id: u64,
        duration: Duration,
        reason: &str,
    ) -> Result<()> {
        let user = user_id.to_string();
        let url = self.url(&["games", game.url_short_name.as_str(), "waits", user.as_str()])?;
        let body = ExpireWaitRequest {
            duration_secs: duration.as_secs(),
            reason,
        };
        self.send(self.client.put(url).json(&body)).await?;
        Ok(())
    }
}
