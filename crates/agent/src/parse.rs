//! Response grammar shared by every agent.
//!
//! Replies are line oriented.  The first non-empty line declares a verdict
//! when one is requested; the rest is a sequence of `Label:` sections whose
//! content is either inline after the colon or a run of bullet / numbered
//! lines below it.  Every reader here either returns the requested value or
//! a [`ParseError`]; none of them fall back to an empty default silently.

use sitcom_memory::is_none;

use crate::error::ParseError;

/// Maximum number of explanation lines kept from a verdict reply.
pub const MAX_EXPLANATION_LINES: usize = 5;

/// Strip list markers, numbering and markdown emphasis from a line.
pub fn clean_line(line: &str) -> &str {
    let mut rest = line.trim();
    loop {
        let before = rest;
        rest = rest.trim_start_matches(['#', '*', '-', '•', '>']).trim_start();
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        if digits > 0 && digits < 4 {
            if let Some(after) = rest[digits..].strip_prefix(['.', ')']) {
                rest = after.trim_start();
            }
        }
        if rest == before {
            break;
        }
    }
    rest.trim_end_matches('*').trim_end()
}

fn is_list_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with(['-', '*', '•']) {
        return true;
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(['.', ')'])
}

/// Value after `key` when the cleaned line starts with it (ASCII case-insensitive).
pub fn strip_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let cleaned = clean_line(line);
    let head = cleaned.get(..key.len())?;
    if head.eq_ignore_ascii_case(key) {
        cleaned.get(key.len()..).map(|rest| rest.trim().trim_start_matches("**").trim())
    } else {
        None
    }
}

/// Inline value of the first `key` line, if it is not a placeholder.
pub fn labeled_value(text: &str, key: &str) -> Option<String> {
    text.lines()
        .find_map(|line| strip_key(line, key))
        .map(strip_brackets)
        .filter(|value| !is_none(value))
        .map(str::to_string)
}

/// Like [`labeled_value`] but missing sections are an error.
pub fn require_value(text: &str, key: &str) -> Result<String, ParseError> {
    labeled_value(text, key).ok_or_else(|| ParseError::MissingSection {
        section: key.trim_end_matches(':').to_string(),
    })
}

/// Items of the section introduced by `header`.
///
/// The section ends at the next line that starts with any of `headers`.
/// Returns `None` when `header` never appears.
pub fn section_items(text: &str, header: &str, headers: &[&str]) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut found = false;
    let mut inside = false;

    for line in text.lines() {
        if let Some(inline) = strip_key(line, header) {
            if found {
                break;
            }
            found = true;
            inside = true;
            let inline = strip_brackets(inline);
            if !is_none(inline) {
                items.push(inline.to_string());
            }
            continue;
        }
        if !inside {
            continue;
        }
        if headers
            .iter()
            .filter(|h| !h.eq_ignore_ascii_case(header))
            .any(|h| strip_key(line, h).is_some())
        {
            break;
        }
        let cleaned = strip_brackets(clean_line(line));
        if !cleaned.is_empty() && !is_none(cleaned) {
            items.push(cleaned.to_string());
        }
    }

    found.then_some(items)
}

/// Section items with a minimum count; extra items are dropped.
pub fn require_items(
    text: &str,
    header: &str,
    headers: &[&str],
    expected: usize,
) -> Result<Vec<String>, ParseError> {
    let section = header.trim_end_matches(':').to_string();
    let items = section_items(text, header, headers)
        .ok_or_else(|| ParseError::MissingSection {
            section: section.clone(),
        })?;
    if items.len() < expected {
        return Err(ParseError::TooFewItems {
            section,
            expected,
            found: items.len(),
        });
    }
    Ok(items.into_iter().take(expected).collect())
}

/// Bullet or numbered items anywhere in `text`.
///
/// When the reply carries no list markers at all, every non-empty line
/// that is not a bare `Label:` header counts as an item.
pub fn list_items(text: &str) -> Vec<String> {
    let marked: Vec<String> = text
        .lines()
        .filter(|line| is_list_line(line))
        .map(|line| strip_brackets(clean_line(line)).to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if !marked.is_empty() {
        return marked;
    }
    text.lines()
        .map(|line| clean_line(line))
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(str::to_string)
        .collect()
}

/// Comma-separated names, tolerating `[...]` wrappers and placeholders.
/// Order is preserved and duplicates are dropped.
pub fn parse_name_list(value: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for raw in strip_brackets(value).split(',') {
        let name = raw.trim().trim_matches(['"', '\'', '.']).trim();
        if name.is_empty() || is_none(name) {
            continue;
        }
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn strip_brackets(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value)
        .trim()
}

// ── Verdicts ──────────────────────────────────────────────────────────────────

/// The yes/no verdict declared on the first line of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub consistent: bool,
    pub line: String,
}

/// Parse the verdict from the first non-empty line of `text`.
///
/// The line is consistent when it contains "yes" (case-insensitive) unless
/// its answer opens with "no", so "No, but mostly fine" reads as
/// inconsistent.  Echoed templates such as "(Yes/No)" are ignored.  A
/// first line carrying neither answer is a [`ParseError::MissingVerdict`].
pub fn parse_verdict(text: &str) -> Result<Verdict, ParseError> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(ParseError::Empty)?;

    let lowered = line.to_lowercase().replace("(yes/no)", " ");
    let cleaned = clean_line(&lowered);
    let answer = match cleaned.rsplit_once(':') {
        Some((_, after)) if !after.trim().is_empty() => after.trim(),
        _ => cleaned,
    };
    let words: Vec<&str> = answer
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let consistent = match words.first() {
        Some(&"no") | Some(&"not") => false,
        _ if answer.contains("yes") => true,
        _ if words.iter().any(|w| *w == "no" || *w == "not") => false,
        _ => {
            return Err(ParseError::MissingVerdict {
                line: line.to_string(),
            });
        }
    };

    Ok(Verdict {
        consistent,
        line: line.to_string(),
    })
}

/// Up to [`MAX_EXPLANATION_LINES`] lines of rationale.
///
/// Taken from the `Explanation:` section when present, otherwise from the
/// lines following the verdict until the next labeled section.
pub fn explanation(text: &str, headers: &[&str]) -> String {
    let lines = section_items(text, "Explanation:", headers).unwrap_or_else(|| {
        text.lines()
            .map(str::trim)
            .skip_while(|line| line.is_empty())
            .skip(1)
            .take_while(|line| !headers.iter().any(|h| strip_key(line, h).is_some()))
            .map(clean_line)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    });
    lines
        .into_iter()
        .take(MAX_EXPLANATION_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}
