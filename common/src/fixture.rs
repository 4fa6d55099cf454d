//! Local fixtures: the canonical upload source and the scratch directory
//! downloaded artifacts land in.

use anyhow::Context;

use crate::report::{Discrepancy, Violation};

/// The local test file, measured once at setup.
///
/// Every size assertion of a run uses the size captured here, so the file can
/// not change under a running cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestFile {
    pub path: std::path::PathBuf,
    pub name: String,
    pub size: u64,
}

impl TestFile {
    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("cannot read test file {:?}", path))?;
        if !metadata.is_file() {
            return Err(anyhow::anyhow!("test file {:?} is not a regular file", path));
        }
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("test file {:?} has no usable file name", path))?
            .to_string();
        tracing::info!("test file {:?}: {} bytes", path, metadata.len());
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
        })
    }
}

/// Local directory receiving downloaded artifacts
#[derive(Clone, Debug)]
pub struct ScratchDir {
    path: std::path::PathBuf,
}

impl ScratchDir {
    #[must_use]
    pub fn new(path: &std::path::Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Local destination for a downloaded artifact
    #[must_use]
    pub fn file(&self, name: &str) -> std::path::PathBuf {
        self.path.join(name)
    }

    /// Deletes and recreates the directory so no artifact outlives its cycle
    pub async fn reset(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("cannot remove scratch dir {:?}", &self.path));
            }
        }
        tokio::fs::create_dir_all(&self.path)
            .await
            .with_context(|| format!("cannot create scratch dir {:?}", &self.path))?;
        tracing::debug!("reset scratch dir {:?}", &self.path);
        Ok(())
    }

    async fn log_contents(&self) -> anyhow::Result<()> {
        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .with_context(|| format!("cannot list scratch dir {:?}", &self.path))?;
        while let Some(entry) = entries.next_entry().await? {
            let len = entry.metadata().await.map(|m| m.len()).unwrap_or_default();
            tracing::debug!("scratch: {:?} {} bytes", entry.file_name(), len);
        }
        Ok(())
    }

    /// Checks that a downloaded artifact exists and has exactly `expected` bytes.
    ///
    /// A missing file and a size mismatch are distinct discrepancy kinds.
    pub async fn check_download(
        &self,
        label: &str,
        name: &str,
        expected: u64,
    ) -> anyhow::Result<Option<Discrepancy>> {
        tracing::info!("checking downloaded file: {}", name);
        self.log_contents().await?;
        let path = self.file(name);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Some(Discrepancy::new(
                    label,
                    Violation::MissingLocalFile {
                        name: name.to_string(),
                    },
                )));
            }
            Err(error) => {
                return Err(error).with_context(|| format!("cannot stat {:?}", path));
            }
        };
        if metadata.len() == expected {
            return Ok(None);
        }
        Ok(Some(Discrepancy::new(
            label,
            Violation::LocalSizeMismatch {
                name: name.to_string(),
                expected,
                actual: metadata.len(),
            },
        )))
    }
}
