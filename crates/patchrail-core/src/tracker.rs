//! Patch tracker collaborator contract and the patchwork REST client.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::series::{Patch, Series};
use crate::verdict::Verdict;

/// The tracker operations the pipeline consumes. The tracker is an opaque
/// service: fetch a series, fetch a full patch, post a check result.
#[async_trait]
pub trait PatchTracker: Send + Sync {
    async fn get_series(&self, series_id: u64) -> Result<Series>;

    /// Fetch one patch with its diff body populated.
    async fn get_patch(&self, patch_id: u64) -> Result<Patch>;

    /// Fetch one patch in mailbox format, suitable for `git am`.
    async fn get_patch_mbox(&self, patch_id: u64) -> Result<String>;

    /// Post a per-patch check result. Called once per stage outcome, and
    /// once per patch for per-patch stages.
    async fn post_check(
        &self,
        patch_id: u64,
        check_name: &str,
        verdict: Verdict,
        description: &str,
        target_url: Option<&str>,
    ) -> Result<()>;
}

/// Check payload the patchwork API expects.
#[derive(Debug, Serialize)]
struct CheckPayload<'a> {
    state: u8,
    context: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
}

/// REST client for a patchwork server.
pub struct PatchworkClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl PatchworkClient {
    /// `base_url` is the server root, e.g. `https://patchwork.example.org`.
    /// The API prefix is appended here.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(%url, "tracker GET");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Tracker(format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Tracker(format!("GET {url}: HTTP {}", resp.status())));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Error::Tracker(format!("decode {url}: {e}")))
    }
}

#[async_trait]
impl PatchTracker for PatchworkClient {
    async fn get_series(&self, series_id: u64) -> Result<Series> {
        self.get_json(&self.api(&format!("series/{series_id}/"))).await
    }

    async fn get_patch(&self, patch_id: u64) -> Result<Patch> {
        self.get_json(&self.api(&format!("patches/{patch_id}/"))).await
    }

    async fn get_patch_mbox(&self, patch_id: u64) -> Result<String> {
        // The mbox lives outside the API prefix.
        let url = format!("{}/patch/{patch_id}/mbox/", self.base_url);
        debug!(%url, "tracker GET");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Tracker(format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Tracker(format!("GET {url}: HTTP {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| Error::Tracker(format!("read {url}: {e}")))
    }

    async fn post_check(
        &self,
        patch_id: u64,
        check_name: &str,
        verdict: Verdict,
        description: &str,
        target_url: Option<&str>,
    ) -> Result<()> {
        let url = self.api(&format!("patches/{patch_id}/checks/"));
        debug!(%url, check = check_name, state = verdict.tracker_state(), "tracker POST");

        let payload = CheckPayload {
            state: verdict.tracker_state(),
            context: check_name,
            description,
            target_url,
        };

        let mut req = self.http.post(&url).json(&payload);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Token {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Tracker(format!("POST {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Tracker(format!(
                "POST {url}: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
