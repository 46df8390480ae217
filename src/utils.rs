//! Utility functions for artifact file names and paths

use crate::error::{ArtifactError, Result};
use std::path::{Path, PathBuf};

/// Maximum number of counter suffixes tried when a timestamped name is also taken
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Choose a destination in `dir` for an artifact claimed by `stem`
///
/// Returns `<stem>.<ext>` when free. Otherwise the name gets the current Unix
/// time in milliseconds (`<stem>_<millis>.<ext>`), and if even that exists a
/// counter is appended. An existing file is never returned, so a claim can
/// never overwrite earlier output.
///
/// # Examples
///
/// ```
/// use profile_export::utils::claim_destination;
///
/// let dir = std::env::temp_dir().join("profile-export-doc-claim");
/// let dest = claim_destination(&dir, "jane-smith", "pdf").unwrap();
/// assert_eq!(dest, dir.join("jane-smith.pdf"));
/// ```
pub fn claim_destination(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    let preferred = dir.join(format!("{stem}.{extension}"));
    if !preferred.exists() {
        return Ok(preferred);
    }

    let millis = chrono::Utc::now().timestamp_millis();
    let stamped = dir.join(format!("{stem}_{millis}.{extension}"));
    if !stamped.exists() {
        return Ok(stamped);
    }

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = dir.join(format!("{stem}_{millis}_{i}.{extension}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(ArtifactError::ClaimFailed {
        source_path: preferred,
        dest_path: stamped,
        reason: format!("no free name after {MAX_RENAME_ATTEMPTS} attempts"),
    }
    .into())
}

/// Whether `path` is a download the browser is still writing
#[must_use]
pub fn is_partial_download(path: &Path, partial_suffixes: &[String]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    partial_suffixes
        .iter()
        .any(|suffix| name.ends_with(&suffix.to_ascii_lowercase()))
}

/// Whether `path` carries `extension` (case-insensitive, no leading dot)
#[must_use]
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
