//! Pulling a JSON object or array out of an LLM response that may be
//! wrapped in a markdown fence or surrounded by explanatory prose.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a fenced code block whose info string is empty, `json`, or
/// `jsonc`, capturing the fenced body.
static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|jsonc)?\s*\n(.*?)\n?```").expect("static regex is valid")
});

/// Extract the largest balanced JSON object or array in `text`.
///
/// Priority order:
/// 1. If `text` parses as JSON outright once trimmed, return it unchanged.
/// 2. If a fenced ```json``` (or bare ```` ``` ````) block contains balanced
///    JSON, return its contents.
/// 3. Otherwise scan the raw text for the first `{` or `[` and return the
///    longest balanced span starting there.
///
/// Returns `None` if no balanced JSON structure can be found at all.
#[must_use]
pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if looks_like_whole_json(trimmed) {
        return Some(trimmed.to_string());
    }

    for capture in JSON_FENCE.captures_iter(text) {
        let body = capture.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if let Some(span) = largest_balanced_span(body) {
            return Some(span);
        }
    }

    largest_balanced_span(text)
}

fn looks_like_whole_json(s: &str) -> bool {
    (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('[') && s.ends_with(']'))
}

/// Scan `s` for the first opening brace/bracket, then track nesting depth
/// (respecting quoted strings and escapes) until it returns to zero. Returns
/// the longest such balanced span found, preferring the first one that
/// closes successfully.
fn largest_balanced_span(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut best: Option<String> = None;

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'{' || c == b'[' {
            if let Some(end) = scan_balanced(bytes, i) {
                let candidate = &s[i..=end];
                let is_longer = best.as_ref().map(|b| candidate.len() > b.len()).unwrap_or(true);
                if is_longer {
                    best = Some(candidate.to_string());
                }
            }
        }
        i += 1;
    }

    best
}

/// Given `bytes[start]` is `{` or `[`, return the index of its matching
/// close bracket, or `None` if the structure never balances.
fn scan_balanced(bytes: &[u8], start: usize) -> Option<usize> {
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if c == b'"' {
                in_string = false;
            }
        } else {
            match c {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        if (open == b'{' && c == close) || (open == b'[' && c == close) {
                            return Some(i);
                        }
                        // Mismatched closer at top-level depth: not balanced.
                        return None;
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_passes_through_unchanged() {
        let input = r#"{"a": 1}"#;
        assert_eq!(extract_json(input).as_deref(), Some(input));
    }

    #[test]
    fn extracts_from_fenced_block() {
        let input = "Here you go:\n```json\n{\"a\": 1, \"b\": [1, 2]}\n```\nLet me know.";
        assert_eq!(
            extract_json(input).as_deref(),
            Some(r#"{"a": 1, "b": [1, 2]}"#)
        );
    }

    #[test]
    fn extracts_from_bare_fence_without_language_tag() {
        let input = "```\n{\"verdict\": \"pass\"}\n```";
        assert_eq!(extract_json(input).as_deref(), Some(r#"{"verdict": "pass"}"#));
    }

    #[test]
    fn extracts_from_surrounding_prose_without_fences() {
        let input = "Sure, here's the result: {\"ok\": true} — let me know if you need changes.";
        assert_eq!(extract_json(input).as_deref(), Some(r#"{"ok": true}"#));
    }

    #[test]
    fn ignores_braces_inside_string_values() {
        let input = r#"{"note": "use { and } for blocks"}"#;
        assert_eq!(extract_json(input).as_deref(), Some(input));
    }

    #[test]
    fn picks_the_largest_balanced_span_when_multiple_exist() {
        let input = "junk {\"a\":1} more junk {\"a\":1,\"b\":2}";
        assert_eq!(
            extract_json(input).as_deref(),
            Some(r#"{"a":1,"b":2}"#)
        );
    }

    #[test]
    fn returns_none_when_nothing_balances() {
        let input = "I could not produce valid output: { missing close";
        assert_eq!(extract_json(input), None);
    }

    #[test]
    fn extracts_array_at_top_level() {
        let input = "```json\n[1, 2, 3]\n```";
        assert_eq!(extract_json(input).as_deref(), Some("[1, 2, 3]"));
    }
}
