//! Pull-request creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RemoteError, RemoteResult};

/// Opens pull requests for pushed promotion branches.
#[async_trait]
pub trait PullRequests: Send + Sync {
    /// Open a pull request from `branch` and return its web URL.
    async fn create(&self, branch: &str, title: &str, body: &str) -> RemoteResult<String>;
}

/// GitHub client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    /// `owner/name` of the repository pull requests are opened against.
    pub repo: String,
    pub token: Option<String>,
    /// Branch pull requests target.
    pub base: String,
    /// Labels applied to every new pull request.
    pub labels: Vec<String>,
    pub api_base: String,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            repo: "openshift/cincinnati-graph-data".to_string(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            base: "master".to_string(),
            labels: vec!["lgtm".to_string(), "approved".to_string()],
            api_base: "https://api.github.com".to_string(),
            user_agent: concat!("channel-promoter/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl GitHubConfig {
    pub fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

#[derive(Debug, Serialize)]
struct CreatePull<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
}

#[derive(Debug, Serialize)]
struct AddLabels<'a> {
    labels: &'a [String],
}

/// reqwest-backed `PullRequests` for the GitHub REST API.
pub struct GitHubPullRequests {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubPullRequests {
    pub fn new(config: GitHubConfig) -> RemoteResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RemoteError::http(&config.api_base, e))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn post(&self, uri: &str, token: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(uri)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }
}

#[async_trait]
impl PullRequests for GitHubPullRequests {
    async fn create(&self, branch: &str, title: &str, body: &str) -> RemoteResult<String> {
        let token = self.config.token.as_deref().ok_or(RemoteError::MissingToken)?;
        let uri = format!("{}/repos/{}/pulls", self.config.api_base, self.config.repo);
        let response = self
            .post(&uri, token)
            .json(&CreatePull {
                title,
                body,
                head: branch,
                base: &self.config.base,
            })
            .send()
            .await
            .map_err(|e| RemoteError::http(&uri, e))?;
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                uri,
                status: response.status().as_u16(),
            });
        }
        let pull: PullResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::decode(&uri, e))?;
        info!(number = pull.number, url = %pull.html_url, "opened pull request");

        if !self.config.labels.is_empty() {
            let labels_uri = format!(
                "{}/repos/{}/issues/{}/labels",
                self.config.api_base, self.config.repo, pull.number
            );
            let labelled = self
                .post(&labels_uri, token)
                .json(&AddLabels {
                    labels: &self.config.labels,
                })
                .send()
                .await;
            match labelled {
                Ok(r) if r.status().is_success() => {}
                Ok(r) => warn!(url = %pull.html_url, status = %r.status(), "failed to label pull request"),
                Err(e) => warn!(url = %pull.html_url, error = %e, "failed to label pull request"),
            }
        }
        Ok(pull.html_url)
    }
}
