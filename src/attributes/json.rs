//! Attributes that travel as JSON strings
//!
//! Some attributes (document metadata, tool parameters) hold mappings that
//! are serialized to a JSON string on the wire instead of being flattened.

use super::value::{AttributeMap, AttributeValue};

/// True if `key` is `suffix` or ends with `{separator}{suffix}`.
pub fn ends_with_segment(key: &str, suffix: &str, separator: &str) -> bool {
    match key.strip_suffix(suffix) {
        Some(head) => head.is_empty() || (!separator.is_empty() && head.ends_with(separator)),
        None => false,
    }
}

/// Parse a JSON object string into a mapping.
///
/// Only a non-empty JSON object yields a mapping. Arrays, scalars, `null`
/// and `{}` yield `None` and the caller keeps the raw string, since the
/// flatten side only ever JSON-encodes non-empty mappings.
pub fn parse_json_object(raw: &str) -> Option<AttributeMap> {
    let json: serde_json::Value = match serde_json::from_str(raw) {
        Ok(json) => json,
        Err(e) => {
            tracing::trace!("Keeping raw JSON-string attribute: {}", e);
            return None;
        }
    };
    match AttributeValue::from_json(&json)? {
        AttributeValue::Map(map) if !map.is_empty() => Some(map),
        _ => None,
    }
}

/// Replace JSON-string attributes with the mappings they encode.
///
/// Keys ending in one of `suffixes` whose value is a string holding a
/// non-empty JSON object are replaced by that object. Everything else,
/// including strings that fail to parse and JSON arrays or scalars such as
/// `"[1, 2]"` or `"42"`, passes through untouched as the original string.
pub fn load_json_strings<'a, I, K, S>(
    pairs: I,
    suffixes: &'a [S],
    separator: &'a str,
) -> impl Iterator<Item = (K, AttributeValue)> + 'a
where
    I: IntoIterator<Item = (K, AttributeValue)>,
    I::IntoIter: 'a,
    K: AsRef<str> + 'a,
    S: AsRef<str>,
{
    pairs.into_iter().map(move |(key, value)| {
        let is_json_key = suffixes
            .iter()
            .any(|suffix| ends_with_segment(key.as_ref(), suffix.as_ref(), separator));
        if !is_json_key {
            return (key, value);
        }
        let parsed = match &value {
            AttributeValue::String(raw) => parse_json_object(raw),
            _ => None,
        };
        match parsed {
            Some(map) => (key, AttributeValue::Map(map)),
            None => (key, value),
        }
    })
}
