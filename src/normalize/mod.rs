use serde::de::DeserializeOwned;

use crate::errors::DprError;

/// Remove a leading fence line (```` ``` ```` plus optional language tag), a
/// trailing fence, and surrounding whitespace.
pub fn strip_fences(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            // single-line fenced output: "```json {...}```"
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    let s = s.trim_end();
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

/// Chapter prose: fences stripped, otherwise accepted as-is.
pub fn normalize_prose(raw: &str) -> Result<String, DprError> {
    let text = strip_fences(raw);
    if text.is_empty() {
        return Err(DprError::malformed(raw));
    }
    Ok(text)
}

/// Fixed recovery recipe for structured documents: strip fences, drop control
/// characters, cut from the first `{` to the last `}`, then escape raw
/// newlines/tabs/CRs inside string literals of that slice. Text around the
/// object never takes part in string tracking.
pub fn extract_json_object(raw: &str) -> Result<String, DprError> {
    let cleaned = strip_control(&strip_fences(raw));
    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(escape_in_strings(&cleaned[s..=e])),
        _ => Err(DprError::malformed(raw)),
    }
}

pub fn normalize_structured<T: DeserializeOwned>(raw: &str) -> Result<T, DprError> {
    let json = extract_json_object(raw)?;
    serde_json::from_str(&json).map_err(|e| {
        tracing::warn!(error = %e, raw = %raw, "structured model output did not parse");
        DprError::malformed(raw)
    })
}

fn strip_control(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Structural whitespace outside strings is left alone; only string contents
/// need escaping to be valid JSON.
fn escape_in_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn fenced_json_extracts_object() {
        let raw = "```json\n{\"a\":1}\n```";
        assert_eq!(extract_json_object(raw).unwrap(), r#"{"a":1}"#);
        let v: Value = normalize_structured(raw).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn quote_in_preamble_does_not_disturb_object() {
        let raw = "Here is the DPR for the 10\" plate unit:\n{\n  \"a\": 1,\n  \"b\": \"two\nlines\"\n}\nHope this helps, \"Asha\".";
        let json = extract_json_object(raw).unwrap();
        assert!(json.starts_with("{\n  \"a\""));
        let v: Value = normalize_structured(raw).unwrap();
        assert_eq!(v["a"], 1);
        assert_eq!(v["b"], "two\nlines");
    }

    #[test]
    fn no_braces_is_malformed() {
        let err = normalize_structured::<Value>("garbage no braces").unwrap_err();
        match err {
            DprError::MalformedModelOutput { raw } => assert_eq!(raw, "garbage no braces"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparseable_object_is_malformed() {
        let err = normalize_structured::<Value>("{ not json }").unwrap_err();
        assert!(matches!(err, DprError::MalformedModelOutput { .. }));
    }

    #[test]
    fn prose_around_object_is_dropped() {
        let raw = "Sure! Here is the report:\n{\"title\": \"x\"}\nHope this helps.";
        let v: Value = normalize_structured(raw).unwrap();
        assert_eq!(v["title"], "x");
    }

    #[test]
    fn raw_newlines_inside_strings_are_escaped() {
        let raw = "{\n  \"summary\": \"line one\nline two\tend\"\n}";
        let v: Value = normalize_structured(raw).unwrap();
        assert_eq!(v["summary"], "line one\nline two\tend");
    }

    #[test]
    fn control_characters_are_removed() {
        let raw = "{\"a\": \"b\u{0007}c\"}";
        let v: Value = normalize_structured(raw).unwrap();
        assert_eq!(v["a"], "bc");
    }

    #[test]
    fn prose_mode_only_strips_fences() {
        let raw = "```markdown\n**Market Analysis**\n\nDemand is {strong}.\n```\n";
        assert_eq!(normalize_prose(raw).unwrap(), "**Market Analysis**\n\nDemand is {strong}.");
    }

    #[test]
    fn unfenced_prose_is_trimmed() {
        assert_eq!(normalize_prose("  plain text \n").unwrap(), "plain text");
    }

    #[test]
    fn blank_prose_is_malformed() {
        assert!(matches!(normalize_prose("```\n```"), Err(DprError::MalformedModelOutput { .. })));
    }

    #[test]
    fn single_line_fence() {
        assert_eq!(strip_fences("```json {\"a\":2}```"), "{\"a\":2}");
    }
}
