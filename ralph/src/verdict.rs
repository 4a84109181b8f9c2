//! Reviewer verdict decoding
//!
//! Reviewer sub-agents return free-form text that should contain a JSON
//! verdict object. Decoding is deliberately tolerant about where the object
//! sits in the text, and deliberately strict about the consequence of
//! failure: anything unparsable is non-approval, never silent acceptance.

use serde::{Deserialize, Serialize};

// ============================================================================
// Verdict
// ============================================================================

/// Structured judgment returned by a review sub-agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewVerdict {
    /// Issues found by the reviewer; free shape, possibly empty
    #[serde(default)]
    pub findings: Vec<serde_json::Value>,

    /// Free-text verdict string, e.g. "patch is correct"
    #[serde(default)]
    pub overall_correctness: String,

    /// Free-text rationale
    #[serde(default)]
    pub overall_explanation: String,

    /// Reviewer confidence in [0, 1]
    #[serde(default)]
    pub overall_confidence_score: f64,
}

impl ReviewVerdict {
    /// A verdict approves the work only when it reports no findings and its
    /// correctness string reads as an affirmative.
    pub fn approves(&self) -> bool {
        self.findings.is_empty() && correctness_affirms(&self.overall_correctness)
    }

    /// Render findings as a bullet list suitable for a correction prompt.
    pub fn findings_text(&self) -> String {
        let mut out = String::new();
        for finding in &self.findings {
            let line = match finding {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push_str("- ");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

fn correctness_affirms(text: &str) -> bool {
    let text = text.to_lowercase();
    if text.contains("incorrect") || text.contains("not correct") {
        return false;
    }
    text.contains("correct") || text.contains("approved") || text.contains("pass")
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VerdictParseError {
    #[error("reviewer output contained no JSON object")]
    MissingJson,

    #[error("reviewer JSON did not match the verdict shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Decode a reviewer's raw output into a verdict.
///
/// Tries the whole output first, then the first balanced JSON object
/// embedded in surrounding prose. Callers map `Err` to rejection.
pub fn parse_verdict(output: &str) -> Result<ReviewVerdict, VerdictParseError> {
    let trimmed = output.trim();
    if trimmed.starts_with('{') {
        if let Ok(verdict) = serde_json::from_str::<ReviewVerdict>(trimmed) {
            return Ok(verdict);
        }
    }

    let json = extract_balanced(output, '{', '}').ok_or(VerdictParseError::MissingJson)?;
    Ok(serde_json::from_str(json)?)
}

/// Find the first balanced `open`..`close` span in `text`.
///
/// Depth counting only; good enough for model output that wraps a JSON
/// payload in prose or code fences.
pub(crate) fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;

    for (offset, c) in text[start..].char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + offset + close.len_utf8()]);
            }
        }
    }

    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_verdict_approves() {
        let verdict = parse_verdict(
            r#"{ "findings": [], "overall_correctness": "patch is correct",
                 "overall_explanation": "looks good", "overall_confidence_score": 0.9 }"#,
        )
        .unwrap();
        assert!(verdict.approves());
        assert!((verdict.overall_confidence_score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_findings_block_approval() {
        let verdict = parse_verdict(
            r#"{ "findings": ["missing error handling"], "overall_correctness": "correct" }"#,
        )
        .unwrap();
        assert!(!verdict.approves());
        assert!(verdict.findings_text().contains("missing error handling"));
    }

    #[test]
    fn test_negative_correctness_blocks_approval() {
        let verdict =
            parse_verdict(r#"{ "findings": [], "overall_correctness": "incorrect" }"#).unwrap();
        assert!(!verdict.approves());

        let verdict =
            parse_verdict(r#"{ "findings": [], "overall_correctness": "not correct" }"#).unwrap();
        assert!(!verdict.approves());
    }

    #[test]
    fn test_verdict_embedded_in_prose() {
        let output = r#"Here is my review.

```json
{ "findings": [], "overall_correctness": "correct", "overall_explanation": "ok" }
```

Let me know if anything is unclear."#;
        let verdict = parse_verdict(output).unwrap();
        assert!(verdict.approves());
    }

    #[test]
    fn test_missing_json_is_an_error() {
        let err = parse_verdict("I think it looks fine overall.").unwrap_err();
        assert!(matches!(err, VerdictParseError::MissingJson));
    }

    #[test]
    fn test_non_verdict_json_defaults_to_rejection_shape() {
        // Parses, but carries none of the verdict fields: empty correctness
        // never affirms.
        let verdict = parse_verdict(r#"{ "unrelated": true }"#).unwrap();
        assert!(!verdict.approves());
    }

    #[test]
    fn test_object_findings_render_in_text() {
        let verdict = parse_verdict(
            r#"{ "findings": [{ "file": "src/lib.rs", "issue": "panic on empty input" }],
                 "overall_correctness": "needs work" }"#,
        )
        .unwrap();
        let text = verdict.findings_text();
        assert!(text.contains("src/lib.rs"));
        assert!(text.contains("panic on empty input"));
    }

    #[test]
    fn test_extract_balanced_nested() {
        let text = r#"prefix { "a": { "b": 1 } } suffix"#;
        assert_eq!(
            extract_balanced(text, '{', '}'),
            Some(r#"{ "a": { "b": 1 } }"#)
        );
    }

    #[test]
    fn test_extract_balanced_unterminated() {
        assert_eq!(extract_balanced(r#"{ "a": 1"#, '{', '}'), None);
    }
}
