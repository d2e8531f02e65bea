//! Dot/bracket path lookups into JSON values.
//!
//! Supported forms: `a.b.c`, `items[0].name`, `items.0.name`,
//! `data["key with spaces"]`, and an optional leading `$.`.

use serde_json::Value as JsonValue;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parses a path into segments.
///
/// Returns `None` for an empty or malformed path.
#[must_use]
pub fn parse(path: &str) -> Option<Vec<Segment>> {
    let path = path.trim();
    let path = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);
    if path.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    let mut rest = path;
    loop {
        // A bare key runs up to the next `.` or `[`; quoted bracket keys
        // may contain either.
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        let (key, tail) = rest.split_at(end);
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        rest = tail;

        let mut bracketed = false;
        while let Some(inner) = rest.strip_prefix('[') {
            let (raw, after) = close_bracket(inner)?;
            segments.push(bracket_segment(raw.trim())?);
            rest = after;
            bracketed = true;
        }
        if key.is_empty() && !bracketed {
            return None;
        }
        if rest.is_empty() {
            return Some(segments);
        }
        rest = rest.strip_prefix('.')?;
    }
}

// Splits the text after a `[` into the bracket contents and what follows
// the matching `]`.
fn close_bracket(inner: &str) -> Option<(&str, &str)> {
    let lead = inner.len() - inner.trim_start().len();
    let quote = inner[lead..].chars().next().filter(|c| *c == '"' || *c == '\'');
    let from = match quote {
        Some(quote) => lead + 1 + inner[lead + 1..].find(quote)? + 1,
        None => 0,
    };
    let close = from + inner[from..].find(']')?;
    Some((&inner[..close], &inner[close + 1..]))
}

fn bracket_segment(raw: &str) -> Option<Segment> {
    if let Ok(index) = raw.parse::<usize>() {
        return Some(Segment::Index(index));
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(raw);
    if unquoted.is_empty() {
        None
    } else {
        Some(Segment::Key(unquoted.to_string()))
    }
}

/// Looks up `path` in `root`.
///
/// Missing keys, out-of-range indexes and malformed paths all yield `None`.
#[must_use]
pub fn lookup<'v>(root: &'v JsonValue, path: &str) -> Option<&'v JsonValue> {
    let segments = parse(path)?;
    segments
        .iter()
        .try_fold(root, |current, segment| match (segment, current) {
            (Segment::Key(key), JsonValue::Object(map)) => map.get(key),
            (Segment::Key(key), JsonValue::Array(items)) => {
                key.parse::<usize>().ok().and_then(|index| items.get(index))
            }
            (Segment::Index(index), JsonValue::Array(items)) => items.get(*index),
            (Segment::Index(index), JsonValue::Object(map)) => map.get(&index.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mixed_segments() {
        assert_eq!(
            parse("data.items[0].name"),
            Some(vec![
                Segment::Key("data".to_string()),
                Segment::Key("items".to_string()),
                Segment::Index(0),
                Segment::Key("name".to_string()),
            ])
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("a..b"), None);
        assert_eq!(parse("a[0"), None);
        assert_eq!(parse("a[0]x"), None);
    }

    #[test]
    fn looks_up_nested_values() {
        let body = json!({
            "data": {"items": [{"name": "first"}, {"name": "second"}]},
            "meta": {"odd key": true}
        });

        assert_eq!(lookup(&body, "data.items[1].name"), Some(&json!("second")));
        assert_eq!(lookup(&body, "data.items.0.name"), Some(&json!("first")));
        assert_eq!(lookup(&body, "$.data.items[0].name"), Some(&json!("first")));
        assert_eq!(lookup(&body, "meta[\"odd key\"]"), Some(&json!(true)));
    }

    #[test]
    fn quoted_bracket_keys_keep_dots() {
        let body = json!({
            "data": {"a.b": 1, "x.y": {"z": [10, 20]}, "c]d": "odd"}
        });

        assert_eq!(lookup(&body, "data[\"a.b\"]"), Some(&json!(1)));
        assert_eq!(lookup(&body, "data['x.y'].z[1]"), Some(&json!(20)));
        assert_eq!(lookup(&body, "data[\"c]d\"]"), Some(&json!("odd")));
        assert_eq!(parse("data[\"a.b\"]x"), None);
        assert_eq!(parse("data[\"a.b]"), None);
    }

    #[test]
    fn missing_paths_are_none() {
        let body = json!({"data": {"items": []}});
        assert_eq!(lookup(&body, "data.items[3]"), None);
        assert_eq!(lookup(&body, "data.nope.deeper"), None);
        assert_eq!(lookup(&body, "data.items.name"), None);
    }

    #[test]
    fn top_level_array_index() {
        let body = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(lookup(&body, "[1].id"), Some(&json!(2)));
    }
}
