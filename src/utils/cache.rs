// src/utils/cache.rs

//! Content-hash keyed on-disk cache of fetched pages.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! └── ab/                 # first hex byte of sha256(url)
//!     └── cd/             # second hex byte
//!         └── abcd…ef     # full digest, holds the body
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Disk cache rooted at a directory, honouring a fixed TTL.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a URL is cached under.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        self.root
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(&digest)
    }

    /// Cached body, or `None` when absent or older than the TTL.
    pub async fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(url);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or_default();
        if age > self.ttl {
            log::debug!("Cache expired for {} ({}s old)", url, age.as_secs());
            return Ok(None);
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write bytes atomically (write to temp, then rename).
    pub async fn put(&self, url: &str, body: &[u8]) -> Result<()> {
        let path = self.path_for(url);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Unique temp name so concurrent writers of one URL never share a file.
        let tmp = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(body).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn two_level_layout() {
        let cache = DiskCache::new("/cache", Duration::from_secs(60));
        let path = cache.path_for("https://example.com/index.php?p=banlist");
        let digest = path.file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(digest.len(), 64);
        let parent = path.parent().unwrap();
        assert_eq!(parent.file_name().unwrap().to_str().unwrap(), &digest[2..4]);
        assert_eq!(
            parent.parent().unwrap().file_name().unwrap().to_str().unwrap(),
            &digest[0..2]
        );
    }

    #[tokio::test]
    async fn write_and_read() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path(), Duration::from_secs(60));

        assert!(cache.get("https://a/").await.unwrap().is_none());
        cache.put("https://a/", b"hello").await.unwrap();
        assert_eq!(cache.get("https://a/").await.unwrap(), Some(b"hello".to_vec()));

        cache.put("https://a/", b"again").await.unwrap();
        assert_eq!(cache.get("https://a/").await.unwrap(), Some(b"again".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path(), Duration::ZERO);
        cache.put("https://a/", b"stale").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("https://a/").await.unwrap().is_none());
    }
}
