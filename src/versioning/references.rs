//! Textual references inside collection contents.
//!
//! Contents embed forms as `form[N]` and other collections as
//! `collection[N]` or `collection(N)`; either spelling may be capitalized.
//! Unpacking replaces each collection reference with the (recursively
//! unpacked) contents of the referenced collection.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn form_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[Ff]orm\[([0-9]+)\]").expect("static pattern"))
}

fn collection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[Cc]ollection[\[\(]([0-9]+)[\]\)]").expect("static pattern")
    })
}

/// Pattern (for SQL `REGEXP`) matching a reference to form `id`.
pub fn form_reference_pattern(id: i64) -> String {
    format!(r"[Ff]orm\[{}\]", id)
}

/// Pattern (for SQL `REGEXP`) matching a reference to collection `id`.
pub fn collection_reference_pattern(id: i64) -> String {
    format!(r"[Cc]ollection[\[\(]{}[\]\)]", id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    Invalid(i64),
    Circular,
    Unauthorized(i64),
}

impl std::fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceError::Invalid(id) => write!(f, "Invalid reference to collection {}", id),
            ReferenceError::Circular => f.write_str("Circular collection reference"),
            ReferenceError::Unauthorized(id) => {
                write!(f, "Unauthorized reference to collection {}", id)
            }
        }
    }
}

/// Distinct collection ids referenced directly by `contents`, in order.
pub fn collection_ids(contents: &str) -> Vec<i64> {
    distinct_ids(collection_pattern(), contents)
}

/// Distinct form ids referenced by `contents`, in order.
pub fn form_ids(contents: &str) -> Vec<i64> {
    distinct_ids(form_pattern(), contents)
}

fn distinct_ids(pattern: &Regex, contents: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    for captures in pattern.captures_iter(contents) {
        if let Some(id) = captures.get(1).and_then(|m| m.as_str().parse().ok()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Expand every collection reference in `contents`.
///
/// `lookup` maps collection ids to their raw contents. `own_id` is the
/// collection being unpacked, if it already exists, so that references back to
/// it are detected as cycles.
pub fn unpack(
    contents: &str,
    own_id: Option<i64>,
    lookup: &HashMap<i64, String>,
) -> Result<String, ReferenceError> {
    let mut stack: Vec<i64> = own_id.into_iter().collect();
    unpack_inner(contents, lookup, &mut stack)
}

fn unpack_inner(
    contents: &str,
    lookup: &HashMap<i64, String>,
    stack: &mut Vec<i64>,
) -> Result<String, ReferenceError> {
    let pattern = collection_pattern();
    let mut output = String::with_capacity(contents.len());
    let mut last = 0;

    for captures in pattern.captures_iter(contents) {
        let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let id: i64 = id.as_str().parse().map_err(|_| ReferenceError::Invalid(0))?;
        if stack.contains(&id) {
            return Err(ReferenceError::Circular);
        }
        let referenced = lookup.get(&id).ok_or(ReferenceError::Invalid(id))?;

        output.push_str(&contents[last..whole.start()]);
        stack.push(id);
        output.push_str(&unpack_inner(referenced, lookup, stack)?);
        stack.pop();
        last = whole.end();
    }

    output.push_str(&contents[last..]);
    Ok(output)
}

/// Remove every reference to form `id`.
pub fn strip_form(contents: &str, id: i64) -> String {
    strip(form_pattern(), contents, id)
}

/// Remove every reference to collection `id`.
pub fn strip_collection(contents: &str, id: i64) -> String {
    strip(collection_pattern(), contents, id)
}

fn strip(pattern: &Regex, contents: &str, id: i64) -> String {
    pattern
        .replace_all(contents, |captures: &regex::Captures| {
            let matches = captures
                .get(1)
                .and_then(|m| m.as_str().parse::<i64>().ok())
                == Some(id);
            if matches {
                String::new()
            } else {
                captures[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(entries: &[(i64, &str)]) -> HashMap<i64, String> {
        entries.iter().map(|(id, c)| (*id, c.to_string())).collect()
    }

    #[test]
    fn test_extract_ids() {
        let contents = "Intro form[3] then Form[12] and form[3] again; see collection[4] and Collection(9)";
        assert_eq!(form_ids(contents), vec![3, 12]);
        assert_eq!(collection_ids(contents), vec![4, 9]);
        assert!(form_ids("form[] form[x] forms[2").is_empty());
    }

    #[test]
    fn test_unpack_nested() {
        let table = lookup(&[(2, "B form[2] collection[3]"), (3, "C form[3]")]);
        let unpacked = unpack("A form[1] collection[2]", Some(1), &table).unwrap();
        assert_eq!(unpacked, "A form[1] B form[2] C form[3]");
        assert_eq!(form_ids(&unpacked), vec![1, 2, 3]);
    }

    #[test]
    fn test_unpack_same_collection_twice_is_not_a_cycle() {
        let table = lookup(&[(2, "x")]);
        assert_eq!(unpack("collection[2]-collection(2)", None, &table).unwrap(), "x-x");
    }

    #[test]
    fn test_unpack_detects_cycles() {
        let table = lookup(&[(2, "collection[3]"), (3, "collection[1]")]);
        assert_eq!(
            unpack("collection[2]", Some(1), &table),
            Err(ReferenceError::Circular)
        );
        assert_eq!(unpack("collection[1]", Some(1), &table), Err(ReferenceError::Circular));
    }

    #[test]
    fn test_unpack_reports_unknown_collection() {
        let err = unpack("collection[77]", None, &HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid reference to collection 77");
    }

    #[test]
    fn test_strip_only_the_given_id() {
        assert_eq!(strip_form("a form[1] b form[12] c Form[1]", 1), "a  b form[12] c ");
        assert_eq!(
            strip_collection("collection[5] collection(5) collection[55]", 5),
            "  collection[55]"
        );
    }

    #[test]
    fn test_sql_patterns_match_references() {
        let pattern = Regex::new(&collection_reference_pattern(5)).unwrap();
        assert!(pattern.is_match("see Collection(5)"));
        assert!(!pattern.is_match("see collection[55]"));
        let pattern = Regex::new(&form_reference_pattern(7)).unwrap();
        assert!(pattern.is_match("form[7]"));
        assert!(!pattern.is_match("form[70]"));
    }
}
