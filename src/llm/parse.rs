//! Resilient extraction of a JSON object from model output, plus the
//! per-stage schema checks applied once an object is in hand.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::project::{Bible, Brief, ChapterContract, Continuity, Outline};

/// Truncation retries before giving up on a candidate
pub const DEFAULT_SALVAGE_ATTEMPTS: usize = 30;

const EXCERPT_CHARS: usize = 400;
const MIN_CANDIDATE_LEN: usize = 2;

/// Remove every ``` marker, along with a language tag that runs to the end
/// of its line (```json, ```JSON5, ...).
pub fn strip_code_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];

        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
            .unwrap_or(rest.len());
        let after_tag = &rest[tag_len..];
        if tag_len > 0
            && (after_tag.is_empty() || after_tag.starts_with('\n') || after_tag.starts_with("\r\n"))
        {
            rest = after_tag;
        }
    }
    out.push_str(rest);
    out
}

/// Parse the single JSON object in `raw`.
///
/// Tries the fence-stripped text as-is, then the span from the first `{` to
/// the last `}`, then progressively shorter prefixes of that span (cut at the
/// last newline, or by one character when there is none). Content is never
/// rewritten, only narrowed.
pub fn parse_json_object(raw: &str, max_attempts: usize) -> Result<Value> {
    let stripped = strip_code_fences(raw);
    let cleaned = stripped.trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err(parse_error("no JSON object found in model output", cleaned)),
    };

    let mut candidate = &cleaned[start..=end];
    for attempt in 0..max_attempts.max(1) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            if attempt > 0 || candidate.len() < cleaned.len() {
                warn!(
                    attempt,
                    kept = candidate.len(),
                    original = cleaned.len(),
                    "salvaged JSON object from model output"
                );
            }
            return Ok(value);
        }
        candidate = shorten(candidate);
        debug!(attempt, remaining = candidate.len(), "truncated salvage candidate");
        if candidate.len() < MIN_CANDIDATE_LEN {
            break;
        }
    }

    Err(parse_error(
        &format!("no parseable JSON object after {} salvage attempts", max_attempts),
        candidate,
    ))
}

fn shorten(candidate: &str) -> &str {
    match candidate.rfind('\n') {
        Some(pos) if pos > 0 => candidate[..pos].trim_end(),
        _ => candidate
            .char_indices()
            .next_back()
            .map_or("", |(i, _)| &candidate[..i]),
    }
}

fn parse_error(message: &str, text: &str) -> Error {
    Error::Parse {
        message: message.to_string(),
        excerpt: text.chars().take(EXCERPT_CHARS).collect(),
    }
}

fn required_object(
    map: &mut Map<String, Value>,
    stage: &'static str,
    field: &'static str,
) -> Result<Value> {
    match map.remove(field) {
        Some(value @ Value::Object(_)) => Ok(value),
        _ => Err(Error::Schema { stage, field }),
    }
}

fn into_object(value: Value, stage: &'static str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Schema {
            stage,
            field: "<root object>",
        }),
    }
}

/// `{brief: {...}, bible: {...}}`
pub fn decode_brief_and_bible(value: Value) -> Result<(Brief, Bible)> {
    const STAGE: &str = "brief+bible";
    let mut map = into_object(value, STAGE)?;
    let brief = required_object(&mut map, STAGE, "brief")?;
    let bible = required_object(&mut map, STAGE, "bible")?;
    Ok((serde_json::from_value(brief)?, serde_json::from_value(bible)?))
}

/// `{outline: {chapterSummaries: [...]}, chapterContracts: [...]}`
pub fn decode_outline(value: Value) -> Result<(Outline, Vec<ChapterContract>)> {
    const STAGE: &str = "outline";
    let mut map = into_object(value, STAGE)?;
    let mut outline = required_object(&mut map, STAGE, "outline")?;

    // Some models nest the contracts inside the outline
    let contracts = map
        .remove("chapterContracts")
        .or_else(|| {
            outline
                .as_object_mut()
                .and_then(|o| o.remove("chapterContracts"))
        })
        .unwrap_or(Value::Null);

    let has_summaries = outline
        .get("chapterSummaries")
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty());
    if !has_summaries {
        return Err(Error::Schema {
            stage: STAGE,
            field: "outline.chapterSummaries",
        });
    }

    let outline: Outline = serde_json::from_value(outline)?;
    let contracts: Vec<ChapterContract> = match contracts {
        Value::Array(_) => serde_json::from_value(contracts)?,
        _ => vec![],
    };
    Ok((outline, contracts))
}

/// Chapter prose and facts returned by a draft or regenerate call
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDraft {
    pub title: Option<String>,
    pub prose: String,
    pub continuity: Option<Continuity>,
}

/// `{title, prose, continuity: {...}}`
pub fn decode_chapter(value: Value) -> Result<ChapterDraft> {
    const STAGE: &str = "chapter";
    let mut map = into_object(value, STAGE)?;

    let prose = match map.remove("prose") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => {
            return Err(Error::Schema {
                stage: STAGE,
                field: "prose",
            })
        }
    };
    let title = map
        .remove("title")
        .and_then(|t| t.as_str().map(|s| s.trim().to_string()))
        .filter(|t| !t.is_empty());
    let continuity = match map.remove("continuity") {
        Some(value @ Value::Object(_)) => Some(serde_json::from_value(value)?),
        _ => None,
    };

    Ok(ChapterDraft {
        title,
        prose,
        continuity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> Result<Value> {
        parse_json_object(raw, DEFAULT_SALVAGE_ATTEMPTS)
    }

    #[test]
    fn test_fenced_object_with_trailing_garbage() {
        let value = parse("```json\n{\"a\":1}\n```garbage after").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_plain_object() {
        assert_eq!(parse(" {\"a\": [1, 2]} ").unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_leading_prose_and_bare_fence() {
        let raw = "Sure! Here it is:\n```\n{\"title\": \"x\"}\n```\nHope that helps.";
        assert_eq!(parse(raw).unwrap(), json!({"title": "x"}));
    }

    #[test]
    fn test_truncated_object_without_closing_brace_fails() {
        let err = parse("{\"a\": 1, \"b\": [1,2,").unwrap_err();
        match err {
            Error::Parse { excerpt, .. } => assert!(excerpt.starts_with("{\"a\"")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_salvages_by_cutting_trailing_lines() {
        let raw = "{\n  \"a\": 1\n}\nNote: the braces } above are fine";
        assert_eq!(parse(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_truncated_nested_object_is_never_invented() {
        // Last `}` closes the inner object; the outer one never closes.
        let raw = "{\"outline\": {\"x\": 1},\n\"chapterContracts\": [{\"index\": 0}";
        assert!(matches!(parse(raw), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_no_braces_reports_excerpt_capped() {
        let raw = "x".repeat(1000);
        match parse(&raw).unwrap_err() {
            Error::Parse { excerpt, .. } => assert_eq!(excerpt.len(), 400),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        assert!(parse("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_fence_tag_only_stripped_at_line_end() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "\n{}\n");
        assert_eq!(strip_code_fences("```note here"), "note here");
    }

    #[test]
    fn test_decode_brief_and_bible_requires_both_keys() {
        let err = decode_brief_and_bible(json!({"brief": {}})).unwrap_err();
        assert!(matches!(err, Error::Schema { field: "bible", .. }));

        let (brief, bible) = decode_brief_and_bible(json!({
            "brief": {"titleSuggestion": "Salt", "themes": ["grief"], "extra": true},
            "bible": {"characters": [{"name": "Alice", "traits": "stubborn"}]}
        }))
        .unwrap();
        assert_eq!(brief.title_suggestion.as_deref(), Some("Salt"));
        assert_eq!(bible.characters[0].traits, vec!["stubborn"]);
    }

    #[test]
    fn test_decode_outline_contracts_nested_or_top_level() {
        let (outline, contracts) = decode_outline(json!({
            "outline": {
                "chapterSummaries": [{"index": 0, "title": "A"}],
                "chapterContracts": [{"index": 0, "mustInclude": ["a storm"]}]
            }
        }))
        .unwrap();
        assert_eq!(outline.chapter_summaries.len(), 1);
        assert_eq!(contracts[0].must_include, vec!["a storm"]);

        let err = decode_outline(json!({"outline": {"chapterSummaries": []}})).unwrap_err();
        assert!(matches!(
            err,
            Error::Schema {
                field: "outline.chapterSummaries",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_chapter_ignores_unknown_source_tag() {
        let draft = decode_chapter(json!({
            "prose": "It rained.",
            "continuity": {"source": "narrator", "openLoops": ["x"]}
        }))
        .unwrap();
        let facts = draft.continuity.unwrap();
        assert_eq!(facts.source, None);
        assert_eq!(facts.open_loops, vec!["x"]);
    }

    #[test]
    fn test_decode_chapter() {
        let draft = decode_chapter(json!({
            "title": "  The Tide ",
            "prose": "It rained.",
            "continuity": {"charactersState": {"Alice": "wet"}, "openLoops": ["umbrella"]}
        }))
        .unwrap();
        assert_eq!(draft.title.as_deref(), Some("The Tide"));
        let facts = draft.continuity.unwrap();
        assert_eq!(facts.characters_state["Alice"], "wet");

        assert!(matches!(
            decode_chapter(json!({"title": "x", "prose": "  "})),
            Err(Error::Schema { field: "prose", .. })
        ));
        let bare = decode_chapter(json!({"prose": "Only prose."})).unwrap();
        assert!(bare.continuity.is_none() && bare.title.is_none());
    }
}
