//! The file handed to every engine of a scan attempt.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file on local disk plus the name the user submitted it under.
///
/// Uploads usually land under a generated temp name, so the original
/// filename is tracked separately for engines that forward it.
///
/// # Examples
///
/// ```rust
/// use scanquorum::core::ScanTarget;
///
/// let target = ScanTarget::from_path("/tmp/upload-7f3a").with_filename("invoice.pdf");
/// assert_eq!(target.filename(), Some("invoice.pdf"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    path: PathBuf,
    filename: Option<String>,
}

impl ScanTarget {
    /// Creates a target from a path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filename: None,
        }
    }

    /// Sets the original filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Returns the path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the original filename, falling back to the path's file name.
    pub fn filename(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .or_else(|| self.path.file_name().and_then(|n| n.to_str()))
    }

    /// Returns the file size in bytes.
    pub async fn size(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Reads the whole file.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl From<PathBuf> for ScanTarget {
    fn from(path: PathBuf) -> Self {
        Self::from_path(path)
    }
}

impl From<&Path> for ScanTarget {
    fn from(path: &Path) -> Self {
        Self::from_path(path.to_path_buf())
    }
}

impl From<&str> for ScanTarget {
    fn from(path: &str) -> Self {
        Self::from_path(path)
    }
}
