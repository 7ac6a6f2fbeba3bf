//! Bytescale upload-and-poll antivirus adapter.
//!
//! # Requirements
//!
//! - Bytescale account id and secret API key
//! - Network access to api.bytescale.com
//!
//! # API Usage
//!
//! 1. Upload the file with a binary upload; a non-2xx answer means the
//!    service rejected it.
//! 2. Poll the file's antivirus URL until the job succeeds or fails, at
//!    most `max_poll_attempts` times, `poll_interval` apart.
//! 3. Delete the uploaded file, whatever the scan produced.

use crate::core::{EngineAdapter, EngineError, EngineOutcome, OutcomeKind, ScanTarget};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ENGINE: &str = "bytescale";

/// Bytescale adapter configuration.
#[derive(Debug, Clone)]
pub struct BytescaleConfig {
    /// Account identifier.
    pub account_id: String,

    /// Secret API key (kept secret).
    pub api_key: SecretString,

    /// Base URL for the API.
    pub base_url: String,

    /// Folder the file is uploaded into.
    pub folder_path: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Interval between polls.
    pub poll_interval: Duration,

    /// Number of polls before giving up.
    pub max_poll_attempts: u32,

    /// Maximum file size to upload.
    pub max_file_size: u64,
}

impl BytescaleConfig {
    /// Creates a new configuration for the given account.
    pub fn new(account_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            api_key: SecretString::new(api_key.into().into()),
            base_url: "https://api.bytescale.com".to_string(),
            folder_path: "/uploads".to_string(),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 10,
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
        }
    }

    /// Sets a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the upload folder.
    pub fn with_folder_path(mut self, path: impl Into<String>) -> Self {
        self.folder_path = path.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum number of polls.
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    /// Sets the maximum file size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }
}

/// State of an antivirus job as reported by one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// The job is still running.
    Pending,
    /// The job finished with this outcome kind and reason.
    Finished(OutcomeKind, String),
}

/// Interprets one antivirus poll response.
pub fn interpret_poll(json: &serde_json::Value) -> PollState {
    match json.get("status").and_then(|s| s.as_str()) {
        Some("Succeeded") => {
            let file = json
                .pointer("/summary/result/files/0")
                .cloned()
                .unwrap_or_default();
            let status = file.get("status").and_then(|s| s.as_str()).unwrap_or("Unknown");
            if status == "Healthy" {
                return PollState::Finished(OutcomeKind::Clean, String::new());
            }
            let detail = file
                .get("skippedReason")
                .or_else(|| file.get("message"))
                .and_then(|s| s.as_str())
                .unwrap_or_default();
            if status == "Infected" {
                let reason = file
                    .get("viruses")
                    .and_then(|v| v.as_array())
                    .map(|v| {
                        v.iter()
                            .filter_map(|n| n.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "detection reported".to_string());
                return PollState::Finished(OutcomeKind::Infected, reason);
            }
            let reason = if detail.is_empty() {
                format!("service returned status '{status}'")
            } else {
                detail.to_string()
            };
            PollState::Finished(OutcomeKind::Unknown, reason)
        }
        Some("Failed") => {
            let message = json
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("scan failed on service side");
            PollState::Finished(OutcomeKind::Unknown, message.to_string())
        }
        _ => PollState::Pending,
    }
}

/// Derives the antivirus job URL from an uploaded file's raw URL.
pub fn antivirus_url(file_url: &str) -> String {
    file_url.replacen("/raw/", "/antivirus/", 1)
}

/// An uploaded file, deleted remotely when dropped.
struct RemoteUpload {
    client: reqwest::Client,
    delete_url: String,
    api_key: SecretString,
    file_path: String,
}

impl RemoteUpload {
    async fn delete(
        client: reqwest::Client,
        url: String,
        api_key: SecretString,
        file_path: String,
    ) {
        let result = client
            .delete(&url)
            .query(&[("filePath", file_path.as_str())])
            .bearer_auth(api_key.expose_secret())
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(engine = ENGINE, file_path = %file_path, "Remote upload deleted");
            }
            Ok(response) => {
                let status = response.status();
                tracing::warn!(engine = ENGINE, %status, "Remote delete failed");
            }
            Err(e) => {
                tracing::warn!(engine = ENGINE, error = %e, "Remote delete failed");
            }
        }
    }
}

impl Drop for RemoteUpload {
    fn drop(&mut self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                engine = ENGINE,
                file_path = %self.file_path,
                "No runtime to delete remote upload"
            );
            return;
        };
        handle.spawn(Self::delete(
            self.client.clone(),
            std::mem::take(&mut self.delete_url),
            self.api_key.clone(),
            std::mem::take(&mut self.file_path),
        ));
    }
}

/// Bytescale adapter implementation.
#[derive(Debug)]
pub struct BytescaleAdapter {
    config: BytescaleConfig,
    client: reqwest::Client,
}

impl BytescaleAdapter {
    /// Creates a new adapter with the given configuration.
    pub fn new(config: BytescaleConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                EngineError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn upload_url(&self) -> String {
        format!("{}/v2/accounts/{}/uploads/binary", self.base(), self.config.account_id)
    }

    fn files_url(&self) -> String {
        format!("{}/v2/accounts/{}/files", self.base(), self.config.account_id)
    }

    /// Uploads the file. `Err` carries the reason the upload was refused.
    async fn upload(
        &self,
        target: &ScanTarget,
        data: Vec<u8>,
    ) -> Result<(String, RemoteUpload), String> {
        let filename = target.filename().unwrap_or("upload.bin");
        let response = self
            .client
            .post(self.upload_url())
            .query(&[("fileName", filename), ("folderPath", self.config.folder_path.as_str())])
            .bearer_auth(self.config.api_key.expose_secret())
            .header("X-Upload-Metadata", "{}")
            .body(data)
            .send()
            .await
            .map_err(|e| format!("upload failed: {e}"))?;

        if !response.status().is_success() {
            tracing::warn!(engine = ENGINE, status = %response.status(), "Upload rejected");
            return Err(format!(
                "service rejected this file type or content ({})",
                response.status()
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("unreadable upload response: {e}"))?;

        let field = |name: &str| {
            body.get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| format!("upload response missing {name}"))
        };
        let file_url = field("fileUrl")?;
        let file_path = field("filePath")?;

        let upload = RemoteUpload {
            client: self.client.clone(),
            delete_url: self.files_url(),
            api_key: self.config.api_key.clone(),
            file_path,
        };
        Ok((file_url, upload))
    }

    /// Fetches one poll response. `None` means the poll should be retried.
    async fn poll_once(&self, url: &str, attempt: u32) -> Option<serde_json::Value> {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<serde_json::Value>().await {
                    Ok(body) => Some(body),
                    Err(e) => {
                        tracing::warn!(
                            engine = ENGINE,
                            attempt,
                            error = %e,
                            "Unreadable poll response"
                        );
                        None
                    }
                }
            }
            Ok(response) => {
                let status = response.status();
                tracing::warn!(engine = ENGINE, attempt, %status, "Poll failed");
                None
            }
            Err(e) => {
                tracing::warn!(engine = ENGINE, attempt, error = %e, "Poll failed");
                None
            }
        }
    }

    async fn poll(&self, url: &str, cancel: &CancellationToken) -> EngineOutcome {
        let attempts = self.config.max_poll_attempts.max(1);
        for attempt in 1..=attempts {
            tracing::debug!(engine = ENGINE, attempt, "Polling antivirus job");

            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return EngineOutcome::cancelled(ENGINE),
                body = self.poll_once(url, attempt) => body,
            };
            if let Some(PollState::Finished(kind, reason)) = body.as_ref().map(interpret_poll) {
                return EngineOutcome::new(ENGINE, kind, reason);
            }

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return EngineOutcome::cancelled(ENGINE),
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        EngineOutcome::timed_out(ENGINE, "scan timed out after multiple attempts")
    }
}

#[async_trait]
impl EngineAdapter for BytescaleAdapter {
    fn name(&self) -> &str {
        ENGINE
    }

    async fn scan(
        &self,
        target: &ScanTarget,
        cancel: &CancellationToken,
    ) -> Result<EngineOutcome, EngineError> {
        if cancel.is_cancelled() {
            return Ok(EngineOutcome::cancelled(ENGINE));
        }

        let data = match target.read().await {
            Ok(data) => data,
            Err(e) => return Ok(EngineOutcome::unknown(ENGINE, format!("cannot read file: {e}"))),
        };
        if data.len() as u64 > self.config.max_file_size {
            return Ok(EngineOutcome::rejected(
                ENGINE,
                format!(
                    "file size {} exceeds limit {}",
                    data.len(),
                    self.config.max_file_size
                ),
            ));
        }

        let uploaded = tokio::select! {
            _ = cancel.cancelled() => return Ok(EngineOutcome::cancelled(ENGINE)),
            uploaded = self.upload(target, data) => uploaded,
        };

        let (file_url, _upload) = match uploaded {
            Ok(uploaded) => uploaded,
            Err(reason) => return Ok(EngineOutcome::rejected(ENGINE, reason)),
        };

        // `_upload` deletes the remote copy when this scope ends.
        Ok(self.poll(&antivirus_url(&file_url), cancel).await)
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        if self.config.account_id.is_empty() || self.config.api_key.expose_secret().is_empty() {
            return Err(EngineError::unavailable(
                ENGINE,
                "account id or API key is not configured",
            ));
        }
        Ok(())
    }

    fn max_file_size(&self) -> Option<u64> {
        Some(self.config.max_file_size)
    }
}
