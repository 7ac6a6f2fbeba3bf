//! ClamAV engine adapter using the `clamscan` command-line scanner.
//!
//! # Requirements
//!
//! - `clamscan` installed and on `PATH` (or configured explicitly)
//! - An up-to-date signature database
//!
//! # Protocol
//!
//! Runs `clamscan <file>` and reads stdout. A line ending in `FOUND` is a
//! detection. The child process is killed when the scan is cancelled.

use crate::core::{EngineAdapter, EngineError, EngineOutcome, ScanTarget};

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const ENGINE: &str = "clamav";

/// Clamscan adapter configuration.
#[derive(Debug, Clone)]
pub struct ClamscanConfig {
    /// Path to the `clamscan` binary.
    pub binary: PathBuf,

    /// Extra arguments placed before the file path.
    pub args: Vec<String>,

    /// Scan timeout.
    pub scan_timeout: Duration,

    /// Maximum file size to scan.
    pub max_file_size: u64,
}

impl Default for ClamscanConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("clamscan"),
            args: vec!["--no-summary".to_string()],
            scan_timeout: Duration::from_secs(300),
            max_file_size: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

impl ClamscanConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path to the `clamscan` binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Replaces the extra arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Sets the maximum file size.
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }
}

/// ClamAV adapter driving a `clamscan` subprocess.
///
/// # Example
///
/// ```rust,ignore
/// use scanquorum::adapters::clamscan::{ClamscanAdapter, ClamscanConfig};
///
/// let adapter = ClamscanAdapter::new(ClamscanConfig::new().with_binary("/usr/bin/clamscan"));
/// ```
#[derive(Debug, Clone)]
pub struct ClamscanAdapter {
    config: ClamscanConfig,
}

impl ClamscanAdapter {
    /// Creates a new adapter with the given configuration.
    pub fn new(config: ClamscanConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for ClamscanAdapter {
    fn default() -> Self {
        Self::new(ClamscanConfig::default())
    }
}

/// Reads clamscan stdout. Returns the signature when a detection is reported.
///
/// Returns `None` when no line reports a detection.
pub fn parse_detection(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let line = line.trim_end();
        let body = line.strip_suffix("FOUND")?;
        let signature = body
            .rsplit_once(": ")
            .map(|(_, sig)| sig)
            .unwrap_or(body)
            .trim();
        Some(if signature.is_empty() {
            "detection reported".to_string()
        } else {
            signature.to_string()
        })
    })
}

#[async_trait]
impl EngineAdapter for ClamscanAdapter {
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

        let size = match target.size().await {
            Ok(size) => size,
            Err(e) => return Ok(EngineOutcome::unknown(ENGINE, format!("cannot read file: {e}"))),
        };
        if size > self.config.max_file_size {
            return Ok(EngineOutcome::rejected(
                ENGINE,
                format!(
                    "file size {} exceeds limit {}",
                    size, self.config.max_file_size
                ),
            ));
        }

        let mut command = self.command();
        command.args(&self.config.args).arg(target.path());

        tracing::debug!(engine = ENGINE, path = %target.path().display(), "Spawning clamscan");

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(engine = ENGINE, error = %e, "Failed to spawn clamscan");
                return Ok(EngineOutcome::unknown(
                    ENGINE,
                    format!("failed to spawn clamscan: {e}"),
                ));
            }
        };

        // Dropping `output` on cancel or timeout kills the child.
        let output = child.wait_with_output();
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(engine = ENGINE, "Killing clamscan after cancellation");
                return Ok(EngineOutcome::cancelled(ENGINE));
            }
            result = tokio::time::timeout(self.config.scan_timeout, output) => match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    let reason = format!("clamscan process error: {e}");
                    return Ok(EngineOutcome::unknown(ENGINE, reason));
                }
                Err(_) => {
                    return Ok(EngineOutcome::timed_out(
                        ENGINE,
                        format!("clamscan did not finish within {:?}", self.config.scan_timeout),
                    ))
                }
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout);

        if let Some(signature) = parse_detection(&stdout) {
            return Ok(EngineOutcome::infected(ENGINE, signature));
        }

        // clamscan exits 0 for clean, 1 for detections and 2 for errors.
        if output.status.success() {
            Ok(EngineOutcome::clean(ENGINE))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().next().unwrap_or("clamscan failed").trim();
            Ok(EngineOutcome::unknown(
                ENGINE,
                format!("clamscan exited with {}: {}", output.status, reason),
            ))
        }
    }

    async fn health_check(&self) -> Result<(), EngineError> {
        let mut command = self.command();
        command.arg("--version");

        let output = tokio::time::timeout(Duration::from_secs(10), command.output())
            .await
            .map_err(|_| EngineError::Timeout {
                engine: ENGINE.to_string(),
                elapsed: Duration::from_secs(10),
            })?
            .map_err(|e| EngineError::unavailable(ENGINE, format!("clamscan not runnable: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::unavailable(
                ENGINE,
                format!("clamscan --version exited with {}", output.status),
            ))
        }
    }

    fn max_file_size(&self) -> Option<u64> {
        Some(self.config.max_file_size)
    }
}
