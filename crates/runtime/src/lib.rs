//! Episode orchestration: pitch, outline, and the per-scene writers' room
//! loop that feeds scene memory.

mod error;
pub mod evaluation;
mod events;
mod runtime;
pub mod writing;

pub use error::{PipelineError, PipelineResult};
pub use events::{PipelineEvent, PipelineState};
pub use evaluation::{BlockScores, Criterion, CriterionScore, ScriptScene};
pub use runtime::{
    Episode, EpisodeRequest, EpisodeRuntime, RelatedScene, SceneOutcome, WritersRoomNotes,
};
pub use writing::{Concept, OutlineReview};
