use chrono::Utc;
use std::path::{Path, PathBuf};

/// Writes uploaded photos to a local directory the analyzer can read.
pub struct LocalPhotoStorage {
    root: PathBuf,
}

impl LocalPhotoStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save `data` as `{nanos}-{filename}` under the storage root and return the
    /// full path. Directory components in the client-supplied name are dropped.
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
        let name = sanitize_filename(filename).ok_or_else(|| {
            StorageError::InvalidFilename(filename.to_string())
        })?;
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros() * 1_000);
        let path = self.root.join(format!("{}-{}", nanos, name));

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, data).await?;

        tracing::debug!(path = %path.display(), bytes = data.len(), "Photo saved");
        Ok(path)
    }

    /// Delete a previously saved photo.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Photo storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unusable photo filename: {0:?}")]
    InvalidFilename(String),
}
