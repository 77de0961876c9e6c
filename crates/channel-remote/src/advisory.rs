//! Errata advisory publication checks.
//!
//! An advisory URI names its type (`RHBA` bug fix or `RHSA` security). The
//! type recorded in release metadata is not always the one it was published
//! under, so both phrasings are tried. A `403` or `404` means the phrasing is
//! not public; any other failure is retried under the configured policy.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RemoteError, RemoteResult};
use crate::retry::{send_with_retry, RetryPolicy};

/// Publication status of one advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryStatus {
    /// The phrasing found public, or the queried URI when none was.
    pub uri: String,
    pub public: bool,
}

/// Checks whether an advisory has been published.
#[async_trait]
pub trait AdvisoryProbe: Send + Sync {
    async fn probe(&self, uri: &str) -> RemoteResult<AdvisoryStatus>;
}

const ADVISORY_TYPES: [&str; 2] = ["RHBA", "RHSA"];

/// Byte offset of the first advisory type marker in `uri`.
fn advisory_type_offset(uri: &str) -> Option<usize> {
    ADVISORY_TYPES.iter().filter_map(|t| uri.find(t)).min()
}

/// All phrasings of `uri` with the advisory type swapped, `RHBA` first.
///
/// Empty when the URI carries no recognisable advisory type.
pub fn advisory_phrasings(uri: &str) -> Vec<String> {
    let Some(start) = advisory_type_offset(uri) else {
        return Vec::new();
    };
    let end = start + 4;
    ADVISORY_TYPES
        .iter()
        .map(|phrasing| format!("{}{}{}", &uri[..start], phrasing, &uri[end..]))
        .collect()
}

/// reqwest-backed `AdvisoryProbe`.
pub struct HttpAdvisoryProbe {
    http_client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpAdvisoryProbe {
    pub fn new(user_agent: &str, retry: RetryPolicy) -> RemoteResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| RemoteError::http("advisory client", e))?;
        Ok(Self { http_client, retry })
    }
}

#[async_trait]
impl AdvisoryProbe for HttpAdvisoryProbe {
    async fn probe(&self, uri: &str) -> RemoteResult<AdvisoryStatus> {
        let phrasings = advisory_phrasings(uri);
        if phrasings.is_empty() {
            warn!(uri, "advisory did not match the advisory type pattern");
        }
        for candidate in phrasings {
            let response =
                send_with_retry(self.retry, &candidate, || self.http_client.get(&candidate).send())
                    .await?;
            match response.status() {
                status if status.is_success() => {
                    return Ok(AdvisoryStatus {
                        uri: candidate,
                        public: true,
                    })
                }
                StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                    debug!(uri = %candidate, status = %response.status(), "advisory not public");
                }
                status => {
                    return Err(RemoteError::Status {
                        uri: candidate,
                        status: status.as_u16(),
                    })
                }
            }
        }
        Ok(AdvisoryStatus {
            uri: uri.to_string(),
            public: false,
        })
    }
}
