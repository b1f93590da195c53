//! Parsing and sanity-checking QA response schemas specifically — the one
//! place the engine needs a typed read out of an otherwise-schema-free
//! blob, since the verdict drives control flow (accept / revise / escalate).

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const PASS: &str = "pass";
pub const FAIL: &str = "fail";
pub const ESCALATE: &str = "escalate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Escalate,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => PASS,
            Verdict::Fail => FAIL,
            Verdict::Escalate => ESCALATE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QaEnvelope {
    verdict: Verdict,
}

#[derive(Debug, Error)]
pub enum QaParseError {
    #[error("QA response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("QA response is missing a recognised verdict field")]
    MissingVerdict,
}

/// Parse a QA response body, extracting just the `verdict`. Any additional
/// fields (feedback, notes) are left for the caller to re-parse against the
/// taskset's own QA schema if it wants them.
pub fn parse_qa_response(bytes: &[u8]) -> Result<Verdict, QaParseError> {
    let envelope: Result<QaEnvelope, _> = serde_json::from_slice(bytes);
    match envelope {
        Ok(e) => Ok(e.verdict),
        Err(_) => {
            // Fall back to a manual lookup so "verdict" values outside the
            // closed enum surface as MissingVerdict rather than a parse error
            // that hides an otherwise-valid document.
            let value: Value = serde_json::from_slice(bytes)?;
            let verdict = value
                .get("verdict")
                .and_then(Value::as_str)
                .ok_or(QaParseError::MissingVerdict)?;
            match verdict {
                PASS => Ok(Verdict::Pass),
                FAIL => Ok(Verdict::Fail),
                ESCALATE => Ok(Verdict::Escalate),
                _ => Err(QaParseError::MissingVerdict),
            }
        }
    }
}

/// Sanity check performed once, at taskset creation time: the QA schema
/// must declare a string `verdict` field whose `enum` covers at least
/// pass/fail/escalate.
pub fn validate_qa_schema(schema: &Value) -> Result<(), String> {
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or("QA schema has no \"properties\" object")?;

    let verdict_schema = properties
        .get("verdict")
        .ok_or("QA schema has no \"verdict\" property")?;

    if verdict_schema.get("type").and_then(Value::as_str) != Some("string") {
        return Err("QA schema's \"verdict\" property must be type \"string\"".to_string());
    }

    let enum_values: Vec<&str> = verdict_schema
        .get("enum")
        .and_then(Value::as_array)
        .ok_or("QA schema's \"verdict\" property must declare an \"enum\"")?
        .iter()
        .filter_map(Value::as_str)
        .collect();

    for required in [PASS, FAIL, ESCALATE] {
        if !enum_values.contains(&required) {
            return Err(format!(
                "QA schema's \"verdict\" enum must include {required:?}"
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_verdicts() {
        assert_eq!(
            parse_qa_response(br#"{"verdict": "pass"}"#).unwrap(),
            Verdict::Pass
        );
        assert_eq!(
            parse_qa_response(br#"{"verdict": "escalate", "notes": "x"}"#).unwrap(),
            Verdict::Escalate
        );
    }

    #[test]
    fn rejects_missing_verdict() {
        let err = parse_qa_response(b"{}").unwrap_err();
        assert!(matches!(err, QaParseError::MissingVerdict));
    }

    #[test]
    fn rejects_unrecognised_verdict_value() {
        let err = parse_qa_response(br#"{"verdict": "maybe"}"#).unwrap_err();
        assert!(matches!(err, QaParseError::MissingVerdict));
    }

    #[test]
    fn validate_qa_schema_accepts_conforming_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "verdict": {"type": "string", "enum": ["pass", "fail", "escalate"]},
            },
        });
        assert!(validate_qa_schema(&schema).is_ok());
    }

    #[test]
    fn validate_qa_schema_rejects_schema_missing_escalate() {
        let schema = json!({
            "type": "object",
            "properties": {
                "verdict": {"type": "string", "enum": ["pass", "fail"]},
            },
        });
        assert!(validate_qa_schema(&schema).is_err());
    }
}
