use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::model::Release;

/// Anything that can report the latest published release of a repository.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// `Ok(None)` when the repository has no published release.
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<Option<Release>>;
}

#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.github.api_base).context("invalid github.api_base")?;
        Self::with_base_url(cfg.github.token.clone(), &cfg.github.user_agent, base_url)
    }

    pub fn with_base_url(token: String, user_agent: &str, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .no_proxy()
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// `{base}/repos/{owner}/{repo}/releases/latest`, each part a single
    /// path segment.
    pub fn latest_release_url(&self, owner: &str, repo: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("github base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "releases", "latest"]);
        Ok(url)
    }

    pub fn build_request(&self, owner: &str, repo: &str) -> Result<reqwest::Request> {
        let endpoint = self.latest_release_url(owner, repo)?;
        self.http
            .get(endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .build()
            .context("failed to build GitHub request")
    }
}

#[async_trait]
impl ReleaseSource for GitHubClient {
    #[instrument(skip(self))]
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<Option<Release>> {
        let request = self.build_request(owner, repo)?;
        debug!(url = %request.url(), "fetching latest release");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach GitHub")?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("GitHub {}: {}", status, body));
        }

        let release: Release = res.json().await.context("invalid GitHub release JSON")?;
        Ok(Some(release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> GitHubClient {
        GitHubClient::with_base_url("gh-token".into(), "release-watch", Url::parse(base).unwrap())
            .unwrap()
    }

    #[test]
    fn url_is_built_from_segments() {
        let c = client("https://api.github.com/");
        let url = c.latest_release_url("tokio-rs", "axum").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/tokio-rs/axum/releases/latest"
        );

        let c = client("https://ghe.example.com/api/v3");
        let url = c.latest_release_url("o", "r").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/o/r/releases/latest"
        );
    }

    #[test]
    fn request_carries_bearer_token() {
        let c = client("https://api.github.com/");
        let req = c.build_request("o", "r").unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer gh-token");
    }

    #[tokio::test]
    async fn latest_release_parses_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/foo/bar/releases/latest"))
            .and(header("authorization", "Bearer gh-token"))
            .and(header("user-agent", "release-watch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tag_name": "v1.1",
                "name": "Release 1.1",
                "body": "changes",
                "html_url": "https://github.com/foo/bar/releases/tag/v1.1",
                "draft": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let release = client(&server.uri())
            .latest_release("foo", "bar")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(release.tag_name, "v1.1");
        assert_eq!(release.name.as_deref(), Some("Release 1.1"));
    }

    #[tokio::test]
    async fn not_found_means_no_release() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/foo/empty/releases/latest"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let release = client(&server.uri())
            .latest_release("foo", "empty")
            .await
            .unwrap();
        assert!(release.is_none());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .latest_release("foo", "bar")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("500"), "{msg}");
        assert!(msg.contains("boom"), "{msg}");
    }
}
