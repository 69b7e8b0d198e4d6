//! On-disk snapshots of service state.
//!
//! Each snapshot is one bincode file under the data directory. Writes go to a
//! synced temporary file in the same directory that is then renamed into
//! place, so a crash mid-write leaves the previous snapshot intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::NodeError;

pub const PROPOSALS_FILE: &str = "proposals.bin";
pub const EXAMS_FILE: &str = "exams.bin";

/// Reads and writes snapshots in one directory.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `file`, or `T::default()` if it does not exist yet.
    pub fn load<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T, NodeError> {
        let path = self.dir.join(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot, starting empty");
                return Ok(T::default());
            }
            Err(e) => return Err(e.into()),
        };
        let value = bincode::deserialize(&bytes)
            .map_err(|e| NodeError::Snapshot(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), bytes = bytes.len(), "snapshot loaded");
        Ok(value)
    }

    /// Atomically replace `file` with `value`.
    pub fn save<T: Serialize>(&self, file: &str, value: &T) -> Result<(), NodeError> {
        fs::create_dir_all(&self.dir)?;
        let bytes = bincode::serialize(value)
            .map_err(|e| NodeError::Snapshot(format!("{file}: {e}")))?;
        let path = self.dir.join(file);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_governance::{ProposalDraft, ProposalEngine};
    use agora_types::CallerId;

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let engine: ProposalEngine = store.load(PROPOSALS_FILE).unwrap();
        assert_eq!(engine.get_proposal_count(), 0);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested"));
        let mut engine = ProposalEngine::new();
        engine
            .create_proposal(&CallerId::new("alice").unwrap(), ProposalDraft::new("x", true))
            .unwrap();

        store.save(PROPOSALS_FILE, &engine).unwrap();
        let loaded: ProposalEngine = store.load(PROPOSALS_FILE).unwrap();
        assert_eq!(loaded.get_proposal_count(), 1);
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let alice = CallerId::new("alice").unwrap();
        let mut engine = ProposalEngine::new();
        for n in 0..3 {
            engine
                .create_proposal(&alice, ProposalDraft::new(format!("p{n}"), true))
                .unwrap();
            store.save(PROPOSALS_FILE, &engine).unwrap();
        }

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(PROPOSALS_FILE)]);
        let loaded: ProposalEngine = store.load(PROPOSALS_FILE).unwrap();
        assert_eq!(loaded.get_proposal_count(), 3);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROPOSALS_FILE), [0xff; 3]).unwrap();
        let store = SnapshotStore::new(dir.path());
        let result: Result<ProposalEngine, _> = store.load(PROPOSALS_FILE);
        assert!(matches!(result, Err(NodeError::Snapshot(_))));
    }
}
