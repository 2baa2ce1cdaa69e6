use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::model::Notification;

/// Push delivery to a human. Errors are reported to the caller, which decides
/// whether they matter.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Bark-style notifier: `GET {server}/{key}/{title}/{body}`.
#[derive(Clone)]
pub struct BarkNotifier {
    http: Client,
    server: Url,
    key: String,
}

impl fmt::Debug for BarkNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarkNotifier")
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

impl BarkNotifier {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let server = Url::parse(&cfg.bark.server).context("invalid bark.server")?;
        Self::new(server, cfg.bark.key.clone())
    }

    pub fn new(server: Url, key: String) -> Result<Self> {
        let http = Client::builder()
            .user_agent("release-watch")
            .no_proxy()
            .build()
            .context("failed to build Bark HTTP client")?;
        Ok(Self { http, server, key })
    }

    /// Title and body are percent-encoded as one path segment each.
    pub fn push_url(&self, notification: &Notification) -> Result<Url> {
        let mut url = self.server.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("bark server URL cannot carry a path: {}", self.server))?
            .pop_if_empty()
            .push(&self.key)
            .push(&notification.title)
            .push(&notification.body);
        Ok(url)
    }
}

#[async_trait]
impl Notifier for BarkNotifier {
    #[instrument(skip_all, fields(title = %notification.title))]
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let url = self.push_url(notification)?;
        debug!(server = %self.server, "sending push");
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach Bark")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("Bark push failed {}: {}", status, body));
        }
        Ok(())
    }
}
