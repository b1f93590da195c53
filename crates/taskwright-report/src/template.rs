//! Mustache-like `{{field}}` substitution, hand-rolled: the variable set
//! per report template is small and flat, so a single-pass scanner over
//! the delimiters is simpler than pulling in a templating engine.

use crate::error::ReportError;
use serde::Deserialize;
use std::collections::HashMap;

/// Replaces every `{{field}}` with its value from `fields`. A field with
/// no entry renders as empty rather than leaving the placeholder intact,
/// so a template typo never leaks literal `{{...}}` text into a report.
pub fn render(template: &str, fields: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let field = after_open[..end].trim();
                if let Some(value) = fields.get(field) {
                    out.push_str(value);
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// One entry in a `*.json` report-template manifest: which suffix this
/// template's output feeds, and which reference-catalog file to render it
/// through.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub suffix: String,
    pub file: String,
}

pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>, ReportError> {
    serde_json::from_str(text)
        .map_err(|err| ReportError::MalformedManifest(text.chars().take(80).collect(), err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_fields_and_drops_unknown_ones() {
        let mut fields = HashMap::new();
        fields.insert("task_title".to_string(), "Widget audit".to_string());
        let rendered = render("## {{task_title}}\n\n{{missing}}status: {{task_title}}", &fields);
        assert_eq!(rendered, "## Widget audit\n\nstatus: Widget audit");
    }

    #[test]
    fn tolerates_an_unterminated_delimiter() {
        let fields = HashMap::new();
        let rendered = render("prefix {{oops", &fields);
        assert_eq!(rendered, "prefix {{oops");
    }

    #[test]
    fn parses_a_manifest_list() {
        let entries = parse_manifest(r#"[{"suffix":"Report","file":"a.md"},{"suffix":"Summary","file":"b.md"}]"#).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].suffix, "Report");
    }

    #[test]
    fn rejects_malformed_manifest_json() {
        assert!(parse_manifest("not json").is_err());
    }
}
