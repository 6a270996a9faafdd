/// Failures of the scene memory store and its JSONL export.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("scene {scene_number}: embedding has {actual} dimensions, memory expects {expected}")]
    DimensionMismatch {
        scene_number: u32,
        expected: usize,
        actual: usize,
    },

    #[error("query embedding has {actual} dimensions, memory expects {expected}")]
    QueryDimensionMismatch { expected: usize, actual: usize },

    #[error("scene {attempted} appended after scene {last}; scene numbers must strictly increase")]
    OutOfOrder { last: u32, attempted: u32 },

    #[error("scene numbers start at 1")]
    InvalidSceneNumber,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
