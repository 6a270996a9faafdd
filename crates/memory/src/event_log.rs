use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::schema::SceneRecord;
use crate::store::SceneMemory;

/// One line of the scene log: a record as it was appended to memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneRecordEvent {
    pub event_id: Uuid,
    /// Identifies the episode run that produced the record.
    pub run_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub record: SceneRecord,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl SceneRecordEvent {
    pub fn new(run_id: Uuid, record: SceneRecord, embedding: Vec<f32>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            run_id,
            occurred_at: Utc::now(),
            record,
            embedding,
        }
    }
}

/// Append-only JSONL trail of the scenes stored during a run.
#[derive(Debug, Clone)]
pub struct SceneEventLog {
    path: PathBuf,
}

impl SceneEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &SceneRecordEvent) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = serde_json::to_string(event)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read every well-formed event.  Corrupt lines are logged and skipped.
    pub fn load(&self) -> StorageResult<Vec<SceneRecordEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for (line_idx, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SceneRecordEvent>(&line) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(
                    line = line_idx + 1,
                    error = %err,
                    path = %self.path.display(),
                    "corrupt scene log line; skipping"
                ),
            }
        }

        Ok(events)
    }

    /// Rebuild the memory of a single run from the log.
    ///
    /// Records go through [`SceneMemory::append`], so a log with mismatched
    /// embeddings or out-of-order scenes is rejected rather than loaded.
    pub fn replay(&self, run_id: Uuid, dimension: usize) -> StorageResult<SceneMemory> {
        let mut memory = SceneMemory::new(dimension);
        for event in self.load()?.into_iter().filter(|e| e.run_id == run_id) {
            memory.append(event.record, event.embedding)?;
        }
        Ok(memory)
    }

    /// Distinct run ids in the order they first appear.
    pub fn runs(&self) -> StorageResult<Vec<Uuid>> {
        let mut runs: Vec<Uuid> = Vec::new();
        for event in self.load()? {
            if !runs.contains(&event.run_id) {
                runs.push(event.run_id);
            }
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::{SceneEventLog, SceneRecordEvent};
    use crate::error::StorageError;
    use crate::schema::{SceneMetadata, SceneRecord};

    fn event(run_id: Uuid, n: u32, dims: usize) -> SceneRecordEvent {
        let record = SceneRecord::new(
            n,
            SceneMetadata::from_summary(format!("scene {n}")),
            format!("script {n}"),
        );
        SceneRecordEvent::new(run_id, record, vec![0.5; dims])
    }

    #[tokio::test]
    async fn append_and_load_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let log = SceneEventLog::new(dir.path().join("nested/scenes.jsonl"));
        let run = Uuid::new_v4();

        log.append(&event(run, 1, 4)).await?;
        log.append(&event(run, 2, 4)).await?;

        let events = log.load()?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].record.summary, "scene 2");
        assert_eq!(events[0].embedding.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn load_skips_corrupt_lines() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("scenes.jsonl");
        let log = SceneEventLog::new(&path);
        let run = Uuid::new_v4();

        log.append(&event(run, 1, 2)).await?;
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
            writeln!(file, "{{not json")?;
        }
        log.append(&event(run, 2, 2)).await?;

        assert_eq!(log.load()?.len(), 2);
        Ok(())
    }

    #[test]
    fn load_nonexistent_returns_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let log = SceneEventLog::new(dir.path().join("missing.jsonl"));
        assert!(log.load()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn replay_rebuilds_one_run() -> Result<()> {
        let dir = TempDir::new()?;
        let log = SceneEventLog::new(dir.path().join("scenes.jsonl"));
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        log.append(&event(first, 1, 3)).await?;
        log.append(&event(second, 1, 3)).await?;
        log.append(&event(first, 2, 3)).await?;

        assert_eq!(log.runs()?, vec![first, second]);
        let memory = log.replay(first, 3)?;
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.last_scene_number(), Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn replay_rejects_wrong_dimension() -> Result<()> {
        let dir = TempDir::new()?;
        let log = SceneEventLog::new(dir.path().join("scenes.jsonl"));
        let run = Uuid::new_v4();
        log.append(&event(run, 1, 3)).await?;

        assert!(matches!(
            log.replay(run, 8),
            Err(StorageError::DimensionMismatch { expected: 8, actual: 3, .. })
        ));
        Ok(())
    }
}
