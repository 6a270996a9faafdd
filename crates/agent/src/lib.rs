//! The writers' room: continuity agents that review each candidate scene
//! against scene memory, and the planner that merges their notes.
//!
//! Every agent follows the same Think, Act, Observe, Recommend cycle and
//! returns a report carrying its internal thoughts alongside an
//! [`AgentRecommendationBundle`] for the [`ScenePlanner`].

pub mod bundle;
pub mod character;
pub mod comedic;
pub mod context;
pub mod environment;
pub mod error;
pub mod llm;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod role;
pub mod text;

#[cfg(test)]
mod testing;

pub use bundle::{AgentRecommendationBundle, SceneRange};
pub use character::{CharacterAgent, CharacterProfile, CharacterReport, FormerCharacter};
pub use comedic::{ComedicAgent, ComedicReport};
pub use context::EvaluationContext;
pub use environment::{EnvironmentAgent, EnvironmentReport, SceneEnvironment};
pub use error::{AgentError, AgentResult, ParseError};
pub use llm::{AgentLlm, CallSite};
pub use planner::{ScenePlan, ScenePlanner};
pub use role::AgentRole;
