use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Public prefix under which stored assets are referenced and served.
pub const UPLOADS_PREFIX: &str = "/uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    File,
}

/// On-disk store for post assets.
///
/// Images live at `{dir}/{name}`, attachments at `{dir}/files/{name}`; they
/// are referenced as `/uploads/{name}` and `/uploads/files/{name}`.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(dir.join("files")).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write an asset under a fresh unique name and return its public reference.
    pub async fn store(&self, kind: AssetKind, original_name: &str, data: &[u8]) -> Result<String> {
        let name = format!(
            "{}-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8],
            sanitize_file_name(original_name)
        );

        let (path, url) = match kind {
            AssetKind::Image => (self.dir.join(&name), format!("{UPLOADS_PREFIX}/{name}")),
            AssetKind::File => (
                self.dir.join("files").join(&name),
                format!("{UPLOADS_PREFIX}/files/{name}"),
            ),
        };

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(url)
    }

    /// Remove a previously stored asset. Missing files are not an error.
    pub async fn delete(&self, url: &str) -> Result<()> {
        let Some(path) = self.path_for_url(url) else {
            bail!("Not a stored asset reference: {}", url);
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted asset {}", url);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Asset {} already gone", url);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of several assets; failures are logged.
    pub async fn delete_all(&self, urls: &[String]) {
        for url in urls {
            if let Err(e) = self.delete(url).await {
                warn!("Failed to delete asset {}: {}", url, e);
            }
        }
    }

    /// Map a public reference back to a path inside the upload directory.
    /// Anything that could escape it is rejected.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let rest = url.strip_prefix(UPLOADS_PREFIX)?.strip_prefix('/')?;
        let (sub, name) = match rest.strip_prefix("files/") {
            Some(name) => (Some("files"), name),
            None => (None, rest),
        };
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return None;
        }
        Some(match sub {
            Some(sub) => self.dir.join(sub).join(name),
            None => self.dir.join(name),
        })
    }
}

/// Keep ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "upload".to_string();
    }
    // Keep the tail so the extension survives.
    let skip = cleaned.chars().count().saturating_sub(100);
    cleaned.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my photo (1).JPG"), "my_photo__1_.JPG");
        assert_eq!(sanitize_file_name("..."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[tokio::test]
    async fn store_and_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();

        let url = storage.store(AssetKind::File, "notes.pdf", b"%PDF").await.unwrap();
        assert!(url.starts_with("/uploads/files/"));
        assert!(url.ends_with("-notes.pdf"));

        let path = storage.path_for_url(&url).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF");

        storage.delete(&url).await.unwrap();
        assert!(!path.exists());
        // Second delete is a no-op.
        storage.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn references_outside_the_store_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf()).await.unwrap();

        assert!(storage.path_for_url("/uploads/../secret").is_none());
        assert!(storage.path_for_url("/uploads/files/../../x").is_none());
        assert!(storage.path_for_url("/etc/passwd").is_none());
        assert!(storage.delete("/static/app.js").await.is_err());
    }
}
