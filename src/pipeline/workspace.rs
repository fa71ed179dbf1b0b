// Per-job staging directory

use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// `{jobs_dir}/{job_id}` and the artifacts staged inside it.
///
/// Removed by [`StagingWorkspace::remove`] on the normal path, and by `Drop`
/// when the owning task unwinds.
#[derive(Debug)]
pub struct StagingWorkspace {
    root: PathBuf,
    removed: bool,
}

impl StagingWorkspace {
    pub async fn create(jobs_dir: &Path, job_id: Uuid) -> io::Result<Self> {
        let root = jobs_dir.join(job_id.to_string());
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root, removed: false })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_apk(&self) -> PathBuf {
        self.root.join("source.apk")
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    pub fn rebuilt_apk(&self) -> PathBuf {
        self.root.join("rebuilt.apk")
    }

    pub fn unsigned_apk(&self) -> PathBuf {
        self.root.join("unsigned.apk")
    }

    pub fn aligned_apk(&self) -> PathBuf {
        self.root.join("aligned.apk")
    }

    /// Delete the directory tree; failures are logged, never raised
    pub async fn remove(mut self) -> bool {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                log::warn!("failed to remove workspace {}: {}", self.root.display(), e);
                false
            }
        }
    }
}

impl Drop for StagingWorkspace {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}
