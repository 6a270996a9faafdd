use serde::{Deserialize, Serialize};

use crate::role::AgentRole;

/// What a continuity agent hands to the scene planner.
///
/// Transient: produced for one scene, consumed by the planner, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecommendationBundle {
    pub agent: AgentRole,
    pub is_consistent: bool,
    pub explanation: String,
    /// Bullet list, one recommendation per line.
    pub recommendations: String,
}

impl AgentRecommendationBundle {
    pub fn new(
        agent: AgentRole,
        is_consistent: bool,
        explanation: impl Into<String>,
        items: &[String],
    ) -> Self {
        Self {
            agent,
            is_consistent,
            explanation: explanation.into(),
            recommendations: bullet_list(items),
        }
    }

    /// Individual recommendations with their bullets removed.
    pub fn items(&self) -> Vec<&str> {
        self.recommendations
            .lines()
            .map(crate::parse::clean_line)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

pub fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The inclusive scene range an agent reports consulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRange {
    pub start: u32,
    pub end: u32,
}

impl SceneRange {
    /// `[max(1, scene_number - num_scenes), scene_number - 1]`.
    pub fn consulted(scene_number: u32, num_scenes: usize) -> Self {
        let span = u32::try_from(num_scenes).unwrap_or(u32::MAX);
        Self {
            start: scene_number.saturating_sub(span).max(1),
            end: scene_number.saturating_sub(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn describe(&self) -> String {
        match (self.start, self.end) {
            _ if self.is_empty() => "none".to_string(),
            (start, end) if start == end => format!("scene {start}"),
            (start, end) => format!("scenes {start}-{end}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consulted_range_is_clamped_at_one() {
        assert_eq!(SceneRange::consulted(5, 3), SceneRange { start: 2, end: 4 });
        assert_eq!(SceneRange::consulted(2, 3), SceneRange { start: 1, end: 1 });
        assert_eq!(SceneRange::consulted(2, 1).describe(), "scene 1");
        assert_eq!(SceneRange::consulted(6, 3).describe(), "scenes 3-5");
        assert!(SceneRange::consulted(1, 3).is_empty());
    }

    #[test]
    fn bundle_items_round_trip_bullets() {
        let bundle = AgentRecommendationBundle::new(
            AgentRole::Environment,
            true,
            "smooth",
            &["Buzzing neon sign".to_string(), " Smell of brass filings ".to_string()],
        );
        assert_eq!(bundle.recommendations, "- Buzzing neon sign\n- Smell of brass filings");
        assert_eq!(bundle.items(), vec!["Buzzing neon sign", "Smell of brass filings"]);
    }
}
