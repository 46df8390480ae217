//! Workspace, target list and download directory fixtures

use filetime::{FileTime, set_file_mtime};
use profile_export::Config;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Canonical profile URLs used across tests
pub const JANE: &str = "https://service.example/in/jane-smith/";
pub const JOHN: &str = "https://service.example/in/john-doe-123456";

/// Target list mixing separators, blanks and a malformed entry
pub const MIXED_TARGET_LIST: &str = "https://service.example/in/jane-smith/, https://service.example/in/john-doe-123456\n\n   \nnot a url,\nhttps://service.example/company/acme\n";

/// A temp directory with a config whose paths all point inside it
pub struct Workspace {
    pub dir: TempDir,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.output_dir = dir.path().join("downloads");
        config.paths.session_file = dir.path().join("cookies.json");
        config.paths.targets_file = dir.path().join("profiles.txt");
        Self { dir, config }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.paths.output_dir
    }

    pub fn write_targets(&self, contents: &str) {
        std::fs::write(&self.config.paths.targets_file, contents).unwrap();
    }

    /// Files in the output directory, sorted by name
    pub fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.output_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Write `name` into `dir` with a fixed modification time
pub fn write_download(dir: &Path, name: &str, unix_secs: i64) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("%PDF-1.7 {name}")).unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
    path
}
