use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::FetchError;
use crate::idset::{self, ObtainedSet};

/// Append-only record file that downloads are written to.
#[derive(Debug, Clone)]
pub struct OutputStore {
    path: Utf8PathBuf,
}

impl OutputStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// True when the file exists and is not empty.
    pub fn has_content(&self) -> Result<bool, FetchError> {
        match fs::metadata(self.path.as_std_path()) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FetchError::Filesystem(format!("stat {}: {err}", self.path))),
        }
    }

    /// Removes the file. Only called after the operator chose to start fresh.
    pub fn reset(&self) -> Result<(), FetchError> {
        match fs::remove_file(self.path.as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FetchError::Filesystem(format!(
                "remove {}: {err}",
                self.path
            ))),
        }
    }

    /// Appends one response body. A missing trailing newline is added so the
    /// next body always starts on a fresh line.
    pub fn append(&self, body: &str) -> Result<usize, FetchError> {
        if body.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| FetchError::Filesystem(err.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("open {}: {err}", self.path)))?;

        let mut written = body.len();
        file.write_all(body.as_bytes())
            .map_err(|err| FetchError::Filesystem(format!("write {}: {err}", self.path)))?;
        if !body.ends_with('\n') {
            file.write_all(b"\n")
                .map_err(|err| FetchError::Filesystem(format!("write {}: {err}", self.path)))?;
            written += 1;
        }
        file.flush()
            .map_err(|err| FetchError::Filesystem(format!("flush {}: {err}", self.path)))?;
        Ok(written)
    }

    pub fn scan(&self) -> Result<ObtainedSet, FetchError> {
        idset::scan_obtained(self.path.as_std_path())
    }

    pub fn header_lines(&self) -> Result<Vec<String>, FetchError> {
        idset::read_header_lines(self.path.as_std_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(dir: &tempfile::TempDir) -> OutputStore {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("out.fasta")).unwrap();
        OutputStore::new(path)
    }

    #[test]
    fn missing_file_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        assert!(!store.has_content().unwrap());
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn append_terminates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.append(">A1 first\nMKT").unwrap();
        store.append(">B2 second\nMKV\n").unwrap();

        let ids = store.scan().unwrap();
        let ids: Vec<_> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B2"]);
        assert!(store.has_content().unwrap());

        store.reset().unwrap();
        assert!(!store.has_content().unwrap());
    }
}
