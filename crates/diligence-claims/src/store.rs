//! Write-once persistence of consolidated records
//!
//! One `<run_id>.json` per run. A second write for the same run leaves the
//! first file in place, so re-running synthesis is idempotent.

use crate::error::{ClaimError, Result};
use crate::record::ConsolidatedRecord;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Written(PathBuf),
    /// A record for this run already existed and was kept
    AlreadyPresent(PathBuf),
}

impl PersistOutcome {
    pub fn path(&self) -> &Path {
        match self {
            PersistOutcome::Written(path) | PersistOutcome::AlreadyPresent(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    pub async fn persist(&self, record: &ConsolidatedRecord) -> Result<PersistOutcome> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&record.run_id);
        let json = record.to_json_pretty()?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(
                    run_id = %record.run_id,
                    path = %path.display(),
                    "record already persisted, keeping the existing file"
                );
                return Ok(PersistOutcome::AlreadyPresent(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;

        info!(run_id = %record.run_id, path = %path.display(), "consolidated record persisted");
        Ok(PersistOutcome::Written(path))
    }

    pub async fn load(&self, run_id: &str) -> Result<ConsolidatedRecord> {
        let path = self.path_for(run_id);
        match fs::try_exists(&path).await {
            Ok(true) => Self::load_path(&path).await,
            Ok(false) => Err(ClaimError::RecordNotFound(run_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a record from any path, e.g. one handed to the CLI
    pub async fn load_path(path: &Path) -> Result<ConsolidatedRecord> {
        let json = fs::read_to_string(path).await?;
        Ok(ConsolidatedRecord::from_json(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ClaimLedger;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(run_id: &str, note: &str) -> ConsolidatedRecord {
        let mut section = crate::record::Section::new(diligence_core::SectionKind::General);
        section.notes.push(note.to_string());
        ConsolidatedRecord {
            run_id: run_id.to_string(),
            created_at: Utc::now(),
            sections: BTreeMap::from([(section.kind, section)]),
            conflicts: Vec::new(),
            ledger: ClaimLedger::new(),
            adjustments: Vec::new(),
            series: None,
            agents: Vec::new(),
            raw_outputs: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_persist_once_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("records"));

        let first = store.persist(&record("run-7", "first")).await.unwrap();
        assert!(matches!(first, PersistOutcome::Written(_)));

        let second = store.persist(&record("run-7", "second")).await.unwrap();
        assert!(matches!(second, PersistOutcome::AlreadyPresent(_)));
        assert_eq!(first.path(), second.path());

        let loaded = store.load("run-7").await.unwrap();
        assert_eq!(loaded.get_section("general").unwrap().notes, vec!["first"]);
    }

    #[tokio::test]
    async fn test_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, ClaimError::RecordNotFound(ref id) if id == "nope"));
    }
}
