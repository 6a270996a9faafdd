use serde::{Deserialize, Serialize};

pub const UNKNOWN_LOCATION: &str = "Unknown";
pub const NO_RECURRING_JOKE: &str = "None";
pub const NEUTRAL_TONE: &str = "neutral";

/// Structured facts extracted from a rendered scene by the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub summary: String,
    /// Names in order of first mention.  Identity is case-sensitive.
    pub characters: Vec<String>,
    pub location: String,
    pub recurring_joke: String,
    pub emotional_tone: String,
}

impl SceneMetadata {
    /// Metadata carrying only a summary; every other field takes its default.
    pub fn from_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            characters: Vec::new(),
            location: UNKNOWN_LOCATION.to_string(),
            recurring_joke: NO_RECURRING_JOKE.to_string(),
            emotional_tone: NEUTRAL_TONE.to_string(),
        }
    }

    pub fn has_recurring_joke(&self) -> bool {
        !is_none(&self.recurring_joke)
    }
}

/// One generated scene as stored in [`crate::SceneMemory`].
///
/// Records are immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_number: u32,
    pub summary: String,
    pub characters: Vec<String>,
    pub location: String,
    pub recurring_joke: String,
    pub emotional_tone: String,
    pub script: String,
}

impl SceneRecord {
    pub fn new(scene_number: u32, metadata: SceneMetadata, script: impl Into<String>) -> Self {
        Self {
            scene_number,
            summary: metadata.summary,
            characters: metadata.characters,
            location: metadata.location,
            recurring_joke: metadata.recurring_joke,
            emotional_tone: metadata.emotional_tone,
            script: script.into(),
        }
    }

    pub fn features(&self, name: &str) -> bool {
        self.characters.iter().any(|c| c == name)
    }

    pub fn has_recurring_joke(&self) -> bool {
        !is_none(&self.recurring_joke)
    }

    pub fn has_known_location(&self) -> bool {
        let location = self.location.trim();
        !location.is_empty() && !location.eq_ignore_ascii_case(UNKNOWN_LOCATION)
    }
}

/// `true` for placeholders such as "None", "n/a" or an empty string.
pub fn is_none(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "none" | "n/a" | "na" | "-" | "null"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_summary_fills_placeholders() {
        let meta = SceneMetadata::from_summary("Pat opens the shop.");
        assert_eq!(meta.location, "Unknown");
        assert_eq!(meta.recurring_joke, "None");
        assert!(!meta.has_recurring_joke());
        assert!(meta.characters.is_empty());
    }

    #[test]
    fn record_queries() {
        let mut meta = SceneMetadata::from_summary("Pat and Lou argue.");
        meta.characters = vec!["Pat".into(), "Lou".into()];
        meta.recurring_joke = "pun-about-locks".into();
        let record = SceneRecord::new(1, meta, "INT. SHOP - DAY");

        assert!(record.features("Pat"));
        assert!(!record.features("pat"));
        assert!(record.has_recurring_joke());
        assert!(!record.has_known_location());
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_none(" None "));
        assert!(is_none("N/A"));
        assert!(is_none(""));
        assert!(!is_none("pun-about-locks"));
    }
}
