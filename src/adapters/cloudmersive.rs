//! Cloudmersive virus scan API adapter.
//!
//! # Requirements
//!
//! - Cloudmersive API key
//! - Network access to api.cloudmersive.com
//!
//! # API Usage
//!
//! The file is posted as an octet stream to `/virus/scan/file` and the
//! `CleanResult` field of the JSON response decides the outcome.

use crate::core::{EngineAdapter, EngineError, EngineOutcome, ScanTarget};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ENGINE: &str = "cloudmersive";

/// Cloudmersive adapter configuration.
#[derive(Debug, Clone)]
pub struct CloudmersiveConfig {
    /// API key (kept secret).
    pub api_key: SecretString,

    /// Base URL for the API.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum file size to upload.
    pub max_file_size: u64,
}

impl CloudmersiveConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into().into()),
            base_url: "https://api.cloudmersive.com".to_string(),
            timeout: Duration::from_secs(120),
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
        }
    }

    /// Sets a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum file size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }
}

/// Cloudmersive adapter implementation.
#[derive(Debug)]
pub struct CloudmersiveAdapter {
    config: CloudmersiveConfig,
    client: reqwest::Client,
}

impl CloudmersiveAdapter {
    /// Creates a new adapter with the given configuration.
    pub fn new(config: CloudmersiveConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                EngineError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn scan_url(&self) -> String {
        format!("{}/virus/scan/file", self.config.base_url.trim_end_matches('/'))
    }
}

/// Maps a Cloudmersive scan response to an outcome.
///
/// A response without a boolean `CleanResult` is `Unknown`.
pub fn parse_scan_response(json: &serde_json::Value) -> EngineOutcome {
    let Some(clean) = json.get("CleanResult").and_then(|v| v.as_bool()) else {
        return EngineOutcome::unknown(ENGINE, "ambiguous response: missing CleanResult");
    };

    if clean {
        return EngineOutcome::clean(ENGINE);
    }

    let names: Vec<&str> = json
        .get("FoundViruses")
        .and_then(|v| v.as_array())
        .map(|viruses| {
            viruses
                .iter()
                .filter_map(|v| v.get("VirusName").and_then(|n| n.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let reason = if names.is_empty() {
        "detection reported".to_string()
    } else {
        names.join(", ")
    };
    EngineOutcome::infected(ENGINE, reason)
}

#[async_trait]
impl EngineAdapter for CloudmersiveAdapter {
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

        let request = self
            .client
            .post(self.scan_url())
            .header("Apikey", self.config.api_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(EngineOutcome::cancelled(ENGINE)),
            response = request => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(EngineOutcome::timed_out(ENGINE, e.to_string()));
            }
            Err(e) => {
                tracing::warn!(engine = ENGINE, error = %e, "Cloudmersive request failed");
                return Ok(EngineOutcome::unknown(ENGINE, format!("request failed: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(engine = ENGINE, %status, "Cloudmersive API error");
            return Ok(EngineOutcome::unknown(
                ENGINE,
                format!("API error {}: {}", status, body.trim()),
            ));
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Ok(EngineOutcome::cancelled(ENGINE)),
            body = response.json::<serde_json::Value>() => body,
        };

        match body {
            Ok(body) => Ok(parse_scan_response(&body)),
            Err(e) => Ok(EngineOutcome::unknown(
                ENGINE,
                format!("unreadable response body: {e}"),
            )),
        }
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        if self.config.api_key.expose_secret().is_empty() {
            return Err(EngineError::unavailable(ENGINE, "API key is not configured"));
        }
        Ok(())
    }

    fn max_file_size(&self) -> Option<u64> {
        Some(self.config.max_file_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutcomeKind;
    use serde_json::json;

    #[test]
    fn test_config_builder() {
        let config = CloudmersiveConfig::new("test-key")
            .with_base_url("http://localhost:8080/")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.base_url, "http://localhost:8080/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.api_key.expose_secret(), "test-key");

        let adapter = CloudmersiveAdapter::new(config).unwrap();
        assert_eq!(adapter.scan_url(), "http://localhost:8080/virus/scan/file");
    }

    #[test]
    fn test_parse_clean_response() {
        let outcome = parse_scan_response(&json!({"CleanResult": true, "FoundViruses": null}));
        assert_eq!(outcome.kind, OutcomeKind::Clean);
    }

    #[test]
    fn test_parse_infected_response() {
        let outcome = parse_scan_response(&json!({
            "CleanResult": false,
            "FoundViruses": [{"FileName": "eicar.com", "VirusName": "EICAR-Test-File"}]
        }));
        assert_eq!(outcome.kind, OutcomeKind::Infected);
        assert_eq!(outcome.failure_reason, "EICAR-Test-File");
    }

    #[test]
    fn test_parse_missing_field_is_unknown() {
        let outcome = parse_scan_response(&json!({"Successful": true}));
        assert_eq!(outcome.kind, OutcomeKind::Unknown);
        assert!(outcome.failure_reason.contains("CleanResult"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unknown() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"hello").unwrap();

        let adapter = CloudmersiveAdapter::new(
            CloudmersiveConfig::new("test-key")
                .with_base_url("http://127.0.0.1:1")
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap();
        let outcome = adapter
            .scan(&ScanTarget::from_path(file.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome.kind, OutcomeKind::Unknown | OutcomeKind::TimedOut));
        assert!(!outcome.failure_reason.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_unknown() {
        let adapter = CloudmersiveAdapter::new(CloudmersiveConfig::new("test-key")).unwrap();
        let outcome = adapter
            .scan(
                &ScanTarget::from_path("/nonexistent/scanquorum-upload.bin"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Unknown);
    }

    #[tokio::test]
    async fn test_empty_key_fails_health_check() {
        let adapter = CloudmersiveAdapter::new(CloudmersiveConfig::new("")).unwrap();
        assert!(adapter.health_check().await.is_err());
    }
}
