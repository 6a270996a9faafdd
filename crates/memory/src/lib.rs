pub mod error;
pub mod event_log;
pub mod schema;
pub mod similarity;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use event_log::{SceneEventLog, SceneRecordEvent};
pub use schema::{
    NEUTRAL_TONE, NO_RECURRING_JOKE, SceneMetadata, SceneRecord, UNKNOWN_LOCATION, is_none,
};
pub use similarity::cosine_similarity;
pub use store::{SceneMemory, ScoredScene};
