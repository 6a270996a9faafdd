use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::schema::SceneRecord;
use crate::similarity::cosine_similarity;

/// A record paired with its similarity to a query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredScene<'a> {
    pub record: &'a SceneRecord,
    pub score: f32,
}

/// Append-only, scene-ordered memory for one episode run.
///
/// Records and embeddings live in parallel vectors, so the index always has
/// exactly one embedding per record.  Appends are all-or-nothing: every check
/// runs before either vector is touched.
#[derive(Debug, Clone)]
pub struct SceneMemory {
    dimension: usize,
    records: Vec<SceneRecord>,
    embeddings: Vec<Vec<f32>>,
}

impl SceneMemory {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Vec::new(),
            embeddings: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn append(&mut self, record: SceneRecord, embedding: Vec<f32>) -> StorageResult<()> {
        if record.scene_number == 0 {
            return Err(StorageError::InvalidSceneNumber);
        }
        if embedding.len() != self.dimension {
            return Err(StorageError::DimensionMismatch {
                scene_number: record.scene_number,
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if let Some(last) = self.last_scene_number() {
            if record.scene_number <= last {
                return Err(StorageError::OutOfOrder {
                    last,
                    attempted: record.scene_number,
                });
            }
        }

        debug!(scene = record.scene_number, total = self.records.len() + 1, "scene appended");
        self.records.push(record);
        self.embeddings.push(embedding);
        Ok(())
    }

    /// The last `n` records in insertion order.
    pub fn window(&self, n: usize) -> &[SceneRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Up to `k` records ranked by cosine similarity to `query`, best first.
    ///
    /// Equal scores keep insertion order, so the earlier scene wins a tie.
    pub fn nearest(&self, query: &[f32], k: usize) -> StorageResult<Vec<ScoredScene<'_>>> {
        if query.len() != self.dimension {
            return Err(StorageError::QueryDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<ScoredScene<'_>> = self
            .records
            .iter()
            .zip(&self.embeddings)
            .map(|(record, embedding)| ScoredScene {
                record,
                score: cosine_similarity(embedding, query),
            })
            .collect();
        // `sort_by` is stable.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Every stored scene featuring `name`, oldest first.
    pub fn appearances(&self, name: &str) -> Vec<&SceneRecord> {
        self.records.iter().filter(|r| r.features(name)).collect()
    }

    pub fn get(&self, scene_number: u32) -> Option<&SceneRecord> {
        self.records.iter().find(|r| r.scene_number == scene_number)
    }

    pub fn last_scene_number(&self) -> Option<u32> {
        self.records.last().map(|r| r.scene_number)
    }

    pub fn all(&self) -> &[SceneRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
