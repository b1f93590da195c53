//! JSON extraction and validation for LLM responses: pulling a JSON blob
//! out of prose/fences, checking it against a draft-07-subset schema, and
//! parsing the one field the engine's control flow actually reads: the QA
//! verdict.

pub mod extract;
pub mod qa;
pub mod validate;

pub use extract::extract_json;
pub use qa::{parse_qa_response, validate_qa_schema, QaParseError, Verdict};
pub use validate::{validate_json, SchemaError, ValidationOutcome};
