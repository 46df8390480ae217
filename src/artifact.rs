//! Artifact detection and claiming
//!
//! The remote service gives no completion signal for an export; the only
//! evidence is a file appearing in the browser's download directory. The
//! resolver polls that directory for a finished artifact (expected extension,
//! no partial-download suffix) and claims the newest one by renaming it after
//! the target identifier.
//!
//! Each target is bracketed by a [`DirectorySnapshot`] taken before the export
//! is triggered, so artifacts claimed for earlier targets never qualify again.

use crate::config::{ArtifactConfig, Config};
use crate::error::{ArtifactError, Result};
use crate::types::TargetId;
use crate::utils::{claim_destination, has_extension, is_partial_download};
use crate::wait::{WaitPolicy, poll_until};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// A finished file in the download directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Location of the file
    pub path: PathBuf,
    /// Last modification time
    pub modified: SystemTime,
    /// Size in bytes
    pub len: u64,
}

/// Modification times of every file in a directory at one instant
#[derive(Clone, Debug, Default)]
pub struct DirectorySnapshot {
    entries: HashMap<PathBuf, SystemTime>,
}

impl DirectorySnapshot {
    /// Whether `path` with modification time `modified` appeared or changed after the snapshot
    pub fn is_new(&self, path: &Path, modified: SystemTime) -> bool {
        self.entries.get(path).is_none_or(|seen| *seen != modified)
    }

    /// Number of files recorded
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory was empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Polls one download directory and claims artifacts out of it
#[derive(Clone, Debug)]
pub struct ArtifactResolver {
    dir: PathBuf,
    extension: String,
    partial_suffixes: Vec<String>,
    poll: WaitPolicy,
}

impl ArtifactResolver {
    /// Resolver over `dir` using `artifact` naming rules and the `poll` wait
    pub fn new(dir: impl Into<PathBuf>, artifact: &ArtifactConfig, poll: WaitPolicy) -> Self {
        Self {
            dir: dir.into(),
            extension: artifact.extension.clone(),
            partial_suffixes: artifact.partial_suffixes.clone(),
            poll,
        }
    }

    /// Resolver over the configured output directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.paths.output_dir.clone(),
            &config.artifact,
            config.timing.artifact_poll,
        )
    }

    /// Record the current state of the directory
    pub async fn snapshot(&self) -> Result<DirectorySnapshot> {
        let mut entries = HashMap::new();
        for (path, metadata) in self.list_files().await? {
            if let Ok(modified) = metadata.modified() {
                entries.insert(path, modified);
            }
        }
        Ok(DirectorySnapshot { entries })
    }

    /// Finished artifacts in the directory, newest first
    ///
    /// With `since`, only files that appeared or changed after that snapshot
    /// are returned.
    pub async fn scan(&self, since: Option<&DirectorySnapshot>) -> Result<Vec<Artifact>> {
        let mut found = Vec::new();
        for (path, metadata) in self.list_files().await? {
            if !has_extension(&path, &self.extension)
                || is_partial_download(&path, &self.partial_suffixes)
            {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if since.is_some_and(|snapshot| !snapshot.is_new(&path, modified)) {
                continue;
            }
            found.push(Artifact {
                path,
                modified,
                len: metadata.len(),
            });
        }
        // newest first, path as a stable tiebreak
        found.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(found)
    }

    /// The newest finished artifact, if any
    pub async fn latest(&self, since: Option<&DirectorySnapshot>) -> Result<Option<Artifact>> {
        Ok(self.scan(since).await?.into_iter().next())
    }

    /// Poll until a finished artifact newer than `since` appears
    ///
    /// Scan errors during polling count as "nothing yet".
    /// [`ArtifactError::DownloadTimeout`] when the poll window closes empty.
    pub async fn wait_for_artifact(&self, since: &DirectorySnapshot) -> Result<Artifact> {
        let found = poll_until(&self.poll, move || async move {
            match self.latest(Some(since)).await {
                Ok(found) => found,
                Err(e) => {
                    debug!(dir = %self.dir.display(), error = %e, "artifact scan failed");
                    None
                }
            }
        })
        .await;

        match found {
            Some(artifact) => {
                debug!(path = %artifact.path.display(), bytes = artifact.len, "artifact detected");
                Ok(artifact)
            }
            None => Err(ArtifactError::DownloadTimeout {
                dir: self.dir.clone(),
                waited_ms: self.poll.timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    /// Rename the newest qualifying artifact to `<target>.<ext>`
    ///
    /// The directory is rescanned so an artifact that finished after detection
    /// still wins by modification time. A taken name gets a timestamp suffix; an
    /// existing file is never overwritten. On rename failure the artifact is
    /// left where it is and [`ArtifactError::ClaimFailed`] is returned.
    pub async fn claim(&self, target: &TargetId, since: Option<&DirectorySnapshot>) -> Result<PathBuf> {
        let artifact = self
            .latest(since)
            .await?
            .ok_or_else(|| ArtifactError::NoCandidate {
                dir: self.dir.clone(),
            })?;

        let preferred = self.dir.join(format!("{}.{}", target, self.extension));
        if artifact.path == preferred {
            info!(target_id = %target, path = %preferred.display(), "artifact already carries target name");
            return Ok(preferred);
        }

        let dest = claim_destination(&self.dir, target.as_str(), &self.extension)?;
        if dest != preferred {
            debug!(target_id = %target, dest = %dest.display(), "name taken, using suffixed destination");
        }

        if let Err(e) = tokio::fs::rename(&artifact.path, &dest).await {
            warn!(
                target_id = %target,
                source = %artifact.path.display(),
                error = %e,
                "failed to claim artifact"
            );
            return Err(ArtifactError::ClaimFailed {
                source_path: artifact.path,
                dest_path: dest,
                reason: e.to_string(),
            }
            .into());
        }

        info!(target_id = %target, path = %dest.display(), "artifact claimed");
        Ok(dest)
    }

    async fn list_files(&self) -> Result<Vec<(PathBuf, std::fs::Metadata)>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // a file may vanish between listing and stat while the browser renames it
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if metadata.is_file() {
                files.push((entry.path(), metadata));
            }
        }
        Ok(files)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use filetime::{FileTime, set_file_mtime};
    use std::time::Duration;
    use tempfile::TempDir;

    fn resolver(dir: &Path) -> ArtifactResolver {
        ArtifactResolver::new(
            dir,
            &ArtifactConfig::default(),
            WaitPolicy::bounded(Duration::from_secs(30), Duration::from_millis(500)),
        )
    }

    fn write_at(dir: &Path, name: &str, unix_secs: i64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
        path
    }

    fn target(id: &str) -> TargetId {
        TargetId(id.to_string())
    }

    #[tokio::test]
    async fn scan_skips_partial_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        write_at(dir.path(), "Profile.pdf.crdownload", 1_700_000_300);
        write_at(dir.path(), "notes.txt", 1_700_000_200);
        write_at(dir.path(), "Profile.pdf", 1_700_000_100);
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let found = resolver(dir.path()).scan(None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, dir.path().join("Profile.pdf"));
    }

    #[tokio::test]
    async fn claim_picks_newest() {
        let dir = TempDir::new().unwrap();
        write_at(dir.path(), "Profile.pdf", 1_700_000_000);
        write_at(dir.path(), "Profile (1).pdf", 1_700_000_500);
        write_at(dir.path(), "Profile (2).pdf", 1_700_000_250);

        let dest = resolver(dir.path()).claim(&target("jane-smith"), None).await.unwrap();

        assert_eq!(dest, dir.path().join("jane-smith.pdf"));
        assert!(!dir.path().join("Profile (1).pdf").exists());
        assert!(dir.path().join("Profile.pdf").exists());
        assert!(dir.path().join("Profile (2).pdf").exists());
    }

    #[tokio::test]
    async fn claim_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("jane-smith.pdf");
        std::fs::write(&existing, b"earlier export").unwrap();
        let snapshot = resolver(dir.path()).snapshot().await.unwrap();
        write_at(dir.path(), "Profile.pdf", 1_800_000_000);

        let dest = resolver(dir.path())
            .claim(&target("jane-smith"), Some(&snapshot))
            .await
            .unwrap();

        assert_ne!(dest, existing);
        assert_eq!(std::fs::read(&existing).unwrap(), b"earlier export");
        let name = dest.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("jane-smith_") && name.ends_with(".pdf"), "got {name}");
    }

    #[tokio::test]
    async fn snapshot_excludes_earlier_artifacts() {
        let dir = TempDir::new().unwrap();
        write_at(dir.path(), "first-target.pdf", 1_700_000_000);
        let resolver = resolver(dir.path());
        let snapshot = resolver.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);

        assert!(resolver.latest(Some(&snapshot)).await.unwrap().is_none());
        let err = resolver.claim(&target("second"), Some(&snapshot)).await.unwrap_err();
        assert!(matches!(err, Error::Artifact(ArtifactError::NoCandidate { .. })));

        write_at(dir.path(), "Profile.pdf", 1_700_000_100);
        let latest = resolver.latest(Some(&snapshot)).await.unwrap().unwrap();
        assert_eq!(latest.path, dir.path().join("Profile.pdf"));
    }

    #[tokio::test]
    async fn file_already_named_after_target_is_kept() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(dir.path());
        let snapshot = resolver.snapshot().await.unwrap();
        let path = write_at(dir.path(), "jane-smith.pdf", 1_700_000_000);

        let dest = resolver.claim(&target("jane-smith"), Some(&snapshot)).await.unwrap();
        assert_eq!(dest, path);
        assert!(path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_on_partial_only() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(dir.path());
        let snapshot = resolver.snapshot().await.unwrap();
        write_at(dir.path(), "Profile.pdf.crdownload", 1_700_000_000);

        let err = resolver.wait_for_artifact(&snapshot).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Artifact(ArtifactError::DownloadTimeout { waited_ms: 30_000, .. })
            ),
            "got {err:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sees_artifact_that_finishes_later() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(dir.path());
        let snapshot = resolver.snapshot().await.unwrap();

        let partial = dir.path().join("Profile.pdf.crdownload");
        std::fs::write(&partial, b"%PDF").unwrap();
        let finished = dir.path().join("Profile.pdf");
        let rename_to = finished.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(4)).await;
            tokio::fs::rename(&partial, &rename_to).await.unwrap();
        });

        let artifact = resolver.wait_for_artifact(&snapshot).await.unwrap();
        assert_eq!(artifact.path, finished);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error_for_scan() {
        let dir = TempDir::new().unwrap();
        let err = resolver(&dir.path().join("absent")).scan(None).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
