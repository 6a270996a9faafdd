//! Pure text helpers over outlines, pitches and model replies.

use std::sync::LazyLock;

use regex::Regex;

static SCENE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t>#*-]*Scene\s+(\d+)\**\s*:\**").expect("scene header regex")
});

static QUOTED_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:"([^"]+)"|“([^”]+)”|\*\*([^*]+)\*\*)"#).expect("quoted title regex")
});

static SCENE_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bscenes?\s*#?\s*(\d+(?:\s*(?:,|and|&|-)\s*\d+)*)").expect("citation regex")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("number regex"));

/// One `Scene N:` block of an outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineScene {
    pub number: u32,
    pub title: Option<String>,
    /// Everything after the `Scene N:` header, title included.
    pub description: String,
}

/// Split an outline into its scene blocks, in document order.
pub fn parse_outline(outline: &str) -> Vec<OutlineScene> {
    let headers: Vec<(u32, usize, usize)> = SCENE_HEADER
        .captures_iter(outline)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse().ok()?;
            Some((number, whole.start(), whole.end()))
        })
        .collect();

    headers
        .iter()
        .enumerate()
        .map(|(idx, &(number, _, body_start))| {
            let body_end = headers
                .get(idx + 1)
                .map(|&(_, next_start, _)| next_start)
                .unwrap_or(outline.len());
            let description = outline[body_start..body_end].trim().to_string();
            OutlineScene {
                number,
                title: quoted_title(&description),
                description,
            }
        })
        .collect()
}

/// The description of scene `scene_number`, if the outline has one.
pub fn extract_scene(outline: &str, scene_number: u32) -> Option<String> {
    parse_outline(outline)
        .into_iter()
        .find(|scene| scene.number == scene_number)
        .map(|scene| scene.description)
        .filter(|description| !description.is_empty())
}

/// Number of scenes in the outline (the highest scene number seen).
pub fn outline_scene_count(outline: &str) -> u32 {
    parse_outline(outline)
        .iter()
        .map(|scene| scene.number)
        .max()
        .unwrap_or(0)
}

/// Premise text that precedes the first scene of an outline.
pub fn episode_concept(outline: &str) -> Option<String> {
    let first = SCENE_HEADER.find(outline).map(|m| m.start()).unwrap_or(outline.len());
    let concept = outline[..first].trim();
    (!concept.is_empty()).then(|| concept.to_string())
}

/// Title from a `Title: "..."` line: the text between the first and last
/// double quote, or the whole value when it is unquoted.
pub fn extract_title(text: &str) -> Option<String> {
    let value = text
        .lines()
        .find_map(|line| crate::parse::strip_key(line, "Title:"))?;
    let title = match (value.find('"'), value.rfind('"')) {
        (Some(first), Some(last)) if last > first => &value[first + 1..last],
        _ => value,
    };
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn quoted_title(description: &str) -> Option<String> {
    let caps = QUOTED_TITLE.captures(description)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .map(|m| m.as_str().trim().to_string())
}

/// Scene numbers cited as `Scene 3`, `scenes 2 and 4`, `Scene #5` ...
/// Sorted and deduplicated.
pub fn cited_scenes(text: &str) -> Vec<u32> {
    let mut numbers: Vec<u32> = SCENE_CITATION
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .flat_map(|group| NUMBER.find_iter(group.as_str()))
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

/// Replace every scene citation with `replacement`.
pub fn strip_scene_citations(text: &str, replacement: &str) -> String {
    SCENE_CITATION.replace_all(text, replacement).into_owned()
}

/// Replace every scene citation that names a scene outside `allowed`.
pub fn strip_citations_outside(text: &str, allowed: &[u32], replacement: &str) -> String {
    SCENE_CITATION
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let grounded = caps.get(1).is_some_and(|group| {
                NUMBER
                    .find_iter(group.as_str())
                    .filter_map(|m| m.as_str().parse::<u32>().ok())
                    .all(|n| allowed.contains(&n))
            });
            if grounded { whole.to_string() } else { replacement.to_string() }
        })
        .into_owned()
}

/// Keep characters safe for a file name; falls back to `untitled`.
pub fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_').to_string();
    if stem.is_empty() { "untitled".to_string() } else { stem }
}
