//! Reply sanitising: turn a raw LLM reply into a JSON object string.
//!
//! Models asked for "JSON only" still sometimes wrap the object in a
//! ` ```json ... ``` ` fence. The fences are stripped here so the decode
//! stage sees only the object. Nothing inside the object is touched.

use crate::error::StageError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters of the offending text kept in a [`StageError::Format`].
const SNIPPET_CHARS: usize = 100;

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?[ \t]*\r?\n?").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?\s*```\s*$").unwrap());

/// Strip markdown fences from `raw` and check it looks like a JSON object.
///
/// 1. Fail with [`StageError::EmptyResponse`] if `raw` is empty.
/// 2. Trim, drop a leading ` ``` ` / ` ```json ` fence, drop a trailing
///    ` ``` ` fence, trim again.
/// 3. Fail with [`StageError::Format`] unless the result starts with `{`
///    and ends with `}`.
///
/// Already-clean JSON passes through unchanged, so sanitising twice gives
/// the same result as sanitising once.
pub fn sanitize(raw: &str) -> Result<String, StageError> {
    if raw.is_empty() {
        return Err(StageError::EmptyResponse);
    }

    let trimmed = raw.trim();
    let without_leading = RE_LEADING_FENCE.replace(trimmed, "");
    let without_trailing = RE_TRAILING_FENCE.replace(&without_leading, "");
    let cleaned = without_trailing.trim();

    if !cleaned.starts_with('{') || !cleaned.ends_with('}') {
        return Err(StageError::Format {
            snippet: cleaned.chars().take(SNIPPET_CHARS).collect(),
        });
    }

    Ok(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences() {
        let input = "```json\n{\"a\":1}\n```";
        assert_eq!(sanitize(input).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_strip_fences_no_lang() {
        let input = "```\n{\"a\":1}\n```";
        assert_eq!(sanitize(input).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_strip_fences_uppercase_tag_and_padding() {
        let input = "  \n```JSON\n{\n  \"a\": 1\n}\n```  \n";
        assert_eq!(sanitize(input).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_no_fences_passthrough() {
        let input = "{\"name\":\"x\"}";
        assert_eq!(sanitize(input).unwrap(), input);
    }

    #[test]
    fn test_idempotent() {
        for input in [
            "```json\n{\"a\":1}\n```",
            "  {\"a\": [1, 2]}  ",
            "```\n{}\n```",
        ] {
            let once = sanitize(input).unwrap();
            let twice = sanitize(&once).unwrap();
            assert_eq!(once, twice, "input: {input:?}");
        }
    }

    #[test]
    fn test_empty_is_empty_response() {
        assert!(matches!(sanitize(""), Err(StageError::EmptyResponse)));
    }

    #[test]
    fn test_whitespace_only_is_format_error() {
        assert!(matches!(sanitize("   \n "), Err(StageError::Format { .. })));
    }

    #[test]
    fn test_prose_is_format_error_with_snippet() {
        let input = "Sorry, I cannot read this statement.";
        match sanitize(input) {
            Err(StageError::Format { snippet }) => assert_eq!(snippet, input),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_snippet_is_truncated_on_char_boundary() {
        let input = "é".repeat(500);
        match sanitize(&input) {
            Err(StageError::Format { snippet }) => assert_eq!(snippet.chars().count(), 100),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_array_is_not_an_object() {
        assert!(matches!(sanitize("[1,2,3]"), Err(StageError::Format { .. })));
    }
}
