//! Name/path grammar and the `tasks/` filename encoding.
//!
//! A taskset path is 1-3 segments joined by `/`, each segment matching
//! `^[a-z0-9][a-z0-9_-]*$` — so a segment may itself contain `-`. To keep
//! the filename encoding reversible, every literal `-` inside a segment
//! is first doubled (`-` -> `--`), then segments are joined with a
//! single `-`. Decoding walks the stem left to right, pairing up `--`
//! back into a literal `-` and treating any remaining lone `-` as a
//! segment boundary.

use once_cell::sync::Lazy;
use regex::Regex;
use taskwright_utils::error::ValidationError;

static PROJECT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("static regex is valid"));

static TASKSET_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("static regex is valid"));

const MAX_NAME_LEN: usize = 128;

pub fn validate_project_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || !PROJECT_NAME_RE.is_match(name) {
        return Err(ValidationError::new(
            "project name",
            name,
            "must match ^[A-Za-z0-9][A-Za-z0-9_-]*$ and be non-empty",
        ));
    }
    Ok(())
}

pub fn validate_taskset_path(path: &str) -> Result<Vec<&str>, ValidationError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.is_empty() || segments.len() > 3 {
        return Err(ValidationError::new(
            "taskset path",
            path,
            "must have 1 to 3 segments separated by '/'",
        ));
    }
    for segment in &segments {
        if segment.len() > MAX_NAME_LEN || !TASKSET_SEGMENT_RE.is_match(segment) {
            return Err(ValidationError::new(
                "taskset path segment",
                *segment,
                "must match ^[a-z0-9][a-z0-9_-]*$",
            ));
        }
    }
    Ok(segments)
}

fn encode_path(path: &str) -> String {
    path.split('/').map(|segment| segment.replace('-', "--")).collect::<Vec<_>>().join("-")
}

/// `a/b/c` -> `a-b-c.json`. Segments containing `-` are escaped first, so
/// the mapping is reversible; see [`filename_to_path`].
pub fn path_to_filename(path: &str) -> String {
    format!("{}.json", encode_path(path))
}

/// The `.lock` file next to a taskset's JSON file.
pub fn path_to_lock_filename(path: &str) -> String {
    format!("{}.json.lock", encode_path(path))
}

/// `a-b-c.json` -> `a/b/c`, reversing [`path_to_filename`].
pub fn filename_to_path(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(".json")?;
    let chars: Vec<char> = stem.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '-' {
            if chars.get(i + 1) == Some(&'-') {
                current.push('-');
                i += 2;
            } else {
                segments.push(std::mem::take(&mut current));
                i += 1;
            }
        } else {
            current.push(chars[i]);
            i += 1;
        }
    }
    segments.push(current);
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_well_formed_project_names() {
        assert!(validate_project_name("my-project_1").is_ok());
    }

    #[test]
    fn rejects_project_name_starting_with_punctuation() {
        assert!(validate_project_name("-bad").is_err());
    }

    #[test]
    fn accepts_one_to_three_segment_paths() {
        assert!(validate_taskset_path("a").is_ok());
        assert!(validate_taskset_path("a/b").is_ok());
        assert!(validate_taskset_path("a/b/c").is_ok());
    }

    #[test]
    fn rejects_more_than_three_segments() {
        assert!(validate_taskset_path("a/b/c/d").is_err());
    }

    #[test]
    fn rejects_segment_with_uppercase() {
        assert!(validate_taskset_path("a/B").is_err());
    }

    #[test]
    fn encodes_path_to_filename() {
        assert_eq!(path_to_filename("a/b/c"), "a-b-c.json");
        assert_eq!(path_to_filename("solo"), "solo.json");
    }

    #[test]
    fn decodes_filename_back_to_path() {
        assert_eq!(filename_to_path("a-b-c.json").as_deref(), Some("a/b/c"));
        assert_eq!(filename_to_path("solo.json").as_deref(), Some("solo"));
        assert_eq!(filename_to_path("solo.lock"), None);
    }

    #[test]
    fn round_trips_segments_with_internal_dashes() {
        for path in ["ab-cd/ef", "a-/b", "a---b/c", "x-y-z/q-r"] {
            let filename = path_to_filename(path);
            assert_eq!(filename_to_path(&filename).as_deref(), Some(path), "round trip broke for {path:?}");
        }
    }

    #[test]
    fn escapes_dashes_before_joining_segments() {
        assert_eq!(path_to_filename("ab-cd/ef"), "ab--cd-ef.json");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]
        #[test]
        fn path_filename_round_trip(segments in prop::collection::vec("[a-z0-9][a-z0-9_-]{0,10}", 1..=3)) {
            let path = segments.join("/");
            prop_assert!(validate_taskset_path(&path).is_ok());
            let filename = path_to_filename(&path);
            prop_assert_eq!(filename_to_path(&filename), Some(path));
        }
    }
}
