//! Recovering structure from free-form oracle output.
//!
//! Oracle text is never trusted to be well-formed. JSON is located by scanning
//! for the first balanced `{...}` span (string-literal aware), so leading prose
//! and code fences are ignored.

use recast_shared::{Delta, StitchReport};
use tracing::warn;

/// Marker that opens the prose section of a chunk response.
pub const CONTENT_MARKER: &str = "[CONTENT]";
/// Marker that opens the JSON delta section of a chunk response.
pub const DELTA_MARKER: &str = "[DELTA]";

/// Return the first balanced `{...}` span in `text`, if any.
///
/// Braces inside JSON string literals (including escaped quotes) do not count.
/// An opening brace that never closes is skipped and the scan restarts at the
/// next one.
pub fn extract_json_object(text: &str) -> Option<&str> {
    text.match_indices('{')
        .find_map(|(start, _)| balanced_len(&text[start..]).map(|len| &text[start..start + len]))
}

/// Byte length of the balanced object opening at the start of `text`.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// How the `[DELTA]` section of a chunk response fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    Parsed,
    /// No `[DELTA]` marker, or no JSON object after it.
    Missing,
    Malformed(String),
}

/// A chunk response split into prose and delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResponse {
    pub content: String,
    pub delta: Delta,
    pub delta_outcome: DeltaOutcome,
}

/// Split a chunk response into its `[CONTENT]` and `[DELTA]` parts.
///
/// Without a content marker the whole text up to `[DELTA]` is treated as
/// content. A missing or malformed delta degrades to an empty one.
pub fn parse_chunk_response(raw: &str) -> ChunkResponse {
    let body = match raw.find(CONTENT_MARKER) {
        Some(i) => &raw[i + CONTENT_MARKER.len()..],
        None => raw,
    };
    let (content, delta_part) = match body.find(DELTA_MARKER) {
        Some(i) => (&body[..i], Some(&body[i + DELTA_MARKER.len()..])),
        None => (body, None),
    };

    let (delta, delta_outcome) = match delta_part.and_then(extract_json_object) {
        None => (Delta::default(), DeltaOutcome::Missing),
        Some(json) => match serde_json::from_str::<Delta>(json) {
            Ok(delta) => (delta, DeltaOutcome::Parsed),
            Err(e) => (Delta::default(), DeltaOutcome::Malformed(e.to_string())),
        },
    };

    ChunkResponse {
        content: content.trim().to_string(),
        delta,
        delta_outcome,
    }
}

/// Parse the stitcher's report. `None` when no usable JSON object came back.
pub fn parse_stitch_report(raw: &str) -> Option<StitchReport> {
    let Some(json) = extract_json_object(raw) else {
        warn!("stitch report had no JSON object");
        return None;
    };
    match serde_json::from_str::<StitchReport>(json) {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = %e, "stitch report was not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_after_prose_and_fences() {
        let raw = "Sure! Here it is:\n```json\n{\"a\": {\"b\": 1}}\n```\nHope that helps {";
        assert_eq!(extract_json_object(raw), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let raw = r#"{"outline": ["use {braces}", "a \"quoted }\" bit"]} trailing"#;
        assert_eq!(
            extract_json_object(raw),
            Some(r#"{"outline": ["use {braces}", "a \"quoted }\" bit"]}"#)
        );
    }

    #[test]
    fn unbalanced_or_absent_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"cut\": \"off"), None);
    }

    #[test]
    fn unclosed_brace_in_prose_is_skipped() {
        let raw = "Plan (draft {v2:\n{\"outline\": [\"a\"], \"thesis\": \"t\"}";
        assert_eq!(
            extract_json_object(raw),
            Some("{\"outline\": [\"a\"], \"thesis\": \"t\"}")
        );
    }

    #[test]
    fn splits_content_and_delta() {
        let raw = "[CONTENT]\nThe rewritten section.\n\n[DELTA]\n{\"newClaims\": [\"x\"], \"topicsCovered\": [\"intro\"]}";
        let parsed = parse_chunk_response(raw);
        assert_eq!(parsed.content, "The rewritten section.");
        assert_eq!(parsed.delta_outcome, DeltaOutcome::Parsed);
        assert_eq!(parsed.delta.new_claims, vec!["x"]);
        assert_eq!(parsed.delta.topics_covered, vec!["intro"]);
    }

    #[test]
    fn missing_markers_keep_whole_text() {
        let parsed = parse_chunk_response("  just prose, no markers  ");
        assert_eq!(parsed.content, "just prose, no markers");
        assert_eq!(parsed.delta_outcome, DeltaOutcome::Missing);
        assert!(parsed.delta.is_empty());
    }

    #[test]
    fn malformed_delta_degrades_to_empty() {
        let parsed = parse_chunk_response("[CONTENT]\nbody\n[DELTA]\n{\"newClaims\": [\"cut");
        assert_eq!(parsed.content, "body");
        assert!(parsed.delta.is_empty());
        assert_eq!(parsed.delta_outcome, DeltaOutcome::Missing);

        let parsed = parse_chunk_response("[CONTENT]\nbody\n[DELTA]\n{\"newClaims\": }");
        assert!(matches!(parsed.delta_outcome, DeltaOutcome::Malformed(_)));
    }

    #[test]
    fn stitch_report_is_lenient() {
        let report = parse_stitch_report(
            "Report:\n{\"conflicts\": [{\"chunks\": [1, 2], \"note\": \"dates\"}], \"gaps\": \"one gap\"}",
        )
        .unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.gaps, vec!["one gap"]);
        assert!(report.redundancies.is_empty());
        assert!(parse_stitch_report("nothing to report").is_none());
    }
}
