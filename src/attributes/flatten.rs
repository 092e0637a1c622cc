//! Nested attributes to dotted `(key, value)` pairs
//!
//! The inverse of [`unflatten`](super::unflatten). Flattening is lazy: an
//! explicit stack of map/sequence cursors is advanced one pair at a time,
//! so callers that stop early never walk the rest of the tree.

use std::collections::btree_map;
use std::iter::Enumerate;
use std::slice;

use serde::{Deserialize, Serialize};

use super::json::ends_with_segment;
use super::trie::PathSegment;
use super::value::{AttributeMap, AttributeValue};

/// Options controlling how a tree is flattened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenOptions {
    /// Prepended to every emitted key
    pub prefix: String,
    /// Joins path segments (default: ".")
    pub separator: String,
    /// Split sequences of mappings into `{key}.{index}` paths
    pub recurse_on_sequence: bool,
    /// Key suffixes whose mapping values are emitted as one JSON string
    pub json_string_attributes: Vec<String>,
    /// Emit only pairs that unflatten back into the same tree: scalars in a
    /// split sequence are kept under their index, and mappings whose keys
    /// would be re-split (numeric, or containing the separator) are emitted
    /// whole.
    #[serde(default)]
    pub lossless: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            separator: ".".to_string(),
            recurse_on_sequence: false,
            json_string_attributes: Vec::new(),
            lossless: false,
        }
    }
}

impl FlattenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_recurse_on_sequence(mut self, recurse: bool) -> Self {
        self.recurse_on_sequence = recurse;
        self
    }

    pub fn with_json_string_attributes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.json_string_attributes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lossless(mut self, lossless: bool) -> Self {
        self.lossless = lossless;
        self
    }

    fn join(&self, prefix: &str, key: &str) -> String {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", prefix, self.separator, key)
        }
    }

    /// True if `key` ends with a JSON-string suffix on a segment boundary.
    fn is_json_string(&self, key: &str) -> bool {
        self.json_string_attributes
            .iter()
            .any(|suffix| ends_with_segment(key, suffix, &self.separator))
    }

    /// True if some key of `map` would not come back as the same single
    /// segment after a flatten/unflatten pass.
    fn has_ambiguous_keys(&self, map: &AttributeMap) -> bool {
        map.keys().any(|key| {
            (!self.separator.is_empty() && key.contains(self.separator.as_str()))
                || matches!(PathSegment::parse(key), PathSegment::Index(_))
        })
    }
}

/// A sequence is split by index only if it holds at least one mapping.
///
/// This keeps plain lists (an embedding vector, a list of tags) intact as
/// a single value.
pub fn has_mapping(items: &[AttributeValue]) -> bool {
    items.iter().any(AttributeValue::is_map)
}

enum Frame<'a> {
    Map {
        prefix: String,
        entries: btree_map::Iter<'a, String, AttributeValue>,
    },
    Seq {
        prefix: String,
        items: Enumerate<slice::Iter<'a, AttributeValue>>,
    },
}

/// Lazy iterator over flattened pairs. See [`flatten`].
pub struct Flatten<'a> {
    options: FlattenOptions,
    stack: Vec<Frame<'a>>,
    pending: Option<(String, AttributeValue)>,
}

impl<'a> Flatten<'a> {
    fn empty(options: FlattenOptions) -> Self {
        Self {
            options,
            stack: Vec::new(),
            pending: None,
        }
    }

    /// Decide what a single entry contributes: either a pair to emit now or
    /// a new frame to descend into.
    fn visit(&mut self, key: String, value: &'a AttributeValue) -> Option<(String, AttributeValue)> {
        match value {
            // Nothing to flatten, keep the empty shape
            AttributeValue::Map(map) if map.is_empty() => Some((key, value.clone())),
            AttributeValue::Map(_) if self.options.is_json_string(&key) => {
                Some((key, AttributeValue::String(value.to_json().to_string())))
            }
            AttributeValue::Map(map)
                if self.options.lossless && self.options.has_ambiguous_keys(map) =>
            {
                Some((key, value.clone()))
            }
            AttributeValue::Map(map) => {
                self.stack.push(Frame::Map {
                    prefix: key,
                    entries: map.iter(),
                });
                None
            }
            AttributeValue::List(items)
                if self.options.recurse_on_sequence && has_mapping(items) =>
            {
                self.stack.push(Frame::Seq {
                    prefix: key,
                    items: items.iter().enumerate(),
                });
                None
            }
            other => Some((key, other.clone())),
        }
    }
}

impl<'a> Iterator for Flatten<'a> {
    type Item = (String, AttributeValue);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(pair) = self.pending.take() {
            return Some(pair);
        }
        loop {
            let step = match self.stack.last_mut()? {
                Frame::Map { prefix, entries } => entries
                    .next()
                    .map(|(key, value)| (self.options.join(prefix, key), value)),
                Frame::Seq { prefix, items } => {
                    // Non-mapping elements of a split sequence are dropped
                    // unless the pairs must rebuild the same tree
                    let lossless = self.options.lossless;
                    let next = items.find(|(_, item)| lossless || item.is_map());
                    next.map(|(i, item)| (self.options.join(prefix, &i.to_string()), item))
                }
            };
            match step {
                Some((key, value)) => {
                    if let Some(pair) = self.visit(key, value) {
                        return Some(pair);
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Flatten a nested value into dotted `(key, value)` pairs.
///
/// A mapping is walked key by key. A sequence containing at least one
/// mapping is walked by index; any other value is emitted whole under the
/// configured prefix.
pub fn flatten(value: &AttributeValue, options: FlattenOptions) -> Flatten<'_> {
    match value {
        AttributeValue::Map(map) => flatten_map(map, options),
        AttributeValue::List(items) if has_mapping(items) => {
            let prefix = options.prefix.clone();
            let mut iter = Flatten::empty(options);
            iter.stack.push(Frame::Seq {
                prefix,
                items: items.iter().enumerate(),
            });
            iter
        }
        other => {
            let pair = (options.prefix.clone(), other.clone());
            let mut iter = Flatten::empty(options);
            iter.pending = Some(pair);
            iter
        }
    }
}

/// Flatten a mapping; equivalent to [`flatten`] on `AttributeValue::Map`.
pub fn flatten_map(map: &AttributeMap, options: FlattenOptions) -> Flatten<'_> {
    let prefix = options.prefix.clone();
    let mut iter = Flatten::empty(options);
    iter.stack.push(Frame::Map {
        prefix,
        entries: map.iter(),
    });
    iter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::unflatten;

    const NO_EXCLUSIONS: &[&str] = &[];

    fn map(entries: Vec<(&str, AttributeValue)>) -> AttributeValue {
        AttributeValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn recursive() -> FlattenOptions {
        FlattenOptions::new().with_recurse_on_sequence(true)
    }

    #[test]
    fn test_scalar_sequence_is_not_split() {
        let value = map(vec![(
            "vector",
            AttributeValue::List(vec![1.0.into(), 2.0.into(), 3.0.into()]),
        )]);
        let pairs: Vec<_> = flatten(&value, recursive()).collect();
        assert_eq!(
            pairs,
            vec![(
                "vector".to_string(),
                AttributeValue::List(vec![1.0.into(), 2.0.into(), 3.0.into()])
            )]
        );
    }

    #[test]
    fn test_mapping_sequence_is_split() {
        let value = map(vec![(
            "documents",
            AttributeValue::List(vec![
                map(vec![("id", "a".into())]),
                map(vec![("id", "b".into())]),
            ]),
        )]);
        let pairs: Vec<_> = flatten(&value, recursive()).collect();
        assert_eq!(
            pairs,
            vec![
                ("documents.0.id".to_string(), AttributeValue::from("a")),
                ("documents.1.id".to_string(), AttributeValue::from("b")),
            ]
        );
    }

    #[test]
    fn test_mapping_sequence_kept_whole_without_recursion() {
        let docs = AttributeValue::List(vec![map(vec![("id", "a".into())])]);
        let value = map(vec![("documents", docs.clone())]);
        let pairs: Vec<_> = flatten(&value, FlattenOptions::new()).collect();
        assert_eq!(pairs, vec![("documents".to_string(), docs)]);
    }

    #[test]
    fn test_non_mapping_elements_skipped_when_splitting() {
        let value = map(vec![(
            "xs",
            AttributeValue::List(vec![
                "loose".into(),
                map(vec![("a", 1i64.into())]),
                7i64.into(),
            ]),
        )]);
        let pairs: Vec<_> = flatten(&value, recursive()).collect();
        assert_eq!(pairs, vec![("xs.1.a".to_string(), AttributeValue::Int(1))]);
    }

    #[test]
    fn test_top_level_sequence_of_mappings() {
        let value = AttributeValue::List(vec![map(vec![("a", 1i64.into())])]);
        let pairs: Vec<_> =
            flatten(&value, FlattenOptions::new().with_prefix("root")).collect();
        assert_eq!(pairs, vec![("root.0.a".to_string(), AttributeValue::Int(1))]);
    }

    #[test]
    fn test_top_level_scalar_uses_prefix() {
        let value = AttributeValue::from("x");
        let pairs: Vec<_> = flatten(&value, FlattenOptions::new().with_prefix("k")).collect();
        assert_eq!(pairs, vec![("k".to_string(), AttributeValue::from("x"))]);
    }

    #[test]
    fn test_json_string_attributes() {
        let value = map(vec![(
            "document",
            map(vec![
                ("metadata", map(vec![("source", "wiki".into())])),
                ("content", "text".into()),
            ]),
        )]);
        let options = recursive().with_json_string_attributes(["document.metadata"]);
        let pairs: Vec<_> = flatten(&value, options).collect();
        assert_eq!(
            pairs,
            vec![
                ("document.content".to_string(), AttributeValue::from("text")),
                (
                    "document.metadata".to_string(),
                    AttributeValue::from(r#"{"source":"wiki"}"#)
                ),
            ]
        );
    }

    #[test]
    fn test_json_suffix_requires_segment_boundary() {
        let value = map(vec![("xmetadata", map(vec![("a", 1i64.into())]))]);
        let options = FlattenOptions::new().with_json_string_attributes(["metadata"]);
        let pairs: Vec<_> = flatten(&value, options).collect();
        assert_eq!(pairs, vec![("xmetadata.a".to_string(), AttributeValue::Int(1))]);
    }

    #[test]
    fn test_empty_mapping_emitted_whole() {
        let value = map(vec![("a", map(vec![])), ("b", 1i64.into())]);
        let pairs: Vec<_> = flatten(&value, recursive()).collect();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), map(vec![])),
                ("b".to_string(), AttributeValue::Int(1)),
            ]
        );
    }

    #[test]
    fn test_is_lazy() {
        let big: AttributeMap = (0..1000)
            .map(|i| (format!("k{:04}", i), AttributeValue::Int(i)))
            .collect();
        let mut iter = flatten_map(&big, FlattenOptions::new());
        assert_eq!(iter.next(), Some(("k0000".to_string(), AttributeValue::Int(0))));
        assert_eq!(iter.stack.len(), 1);
    }

    #[test]
    fn test_round_trip_with_unflatten() {
        let value = map(vec![
            ("name", "agent".into()),
            ("nan", f64::NAN.into()),
            ("empty_list", AttributeValue::List(vec![])),
            ("empty_map", map(vec![])),
            (
                "steps",
                AttributeValue::List(vec![
                    map(vec![
                        ("tool", "search".into()),
                        ("scores", AttributeValue::List(vec![0.5.into(), 0.25.into()])),
                        (
                            "children",
                            AttributeValue::List(vec![map(vec![(
                                "inner",
                                AttributeValue::List(vec![map(vec![("deep", true.into())])]),
                            )])]),
                        ),
                    ]),
                    map(vec![("tool", "answer".into()), ("raw", vec![1u8, 2, 3].into())]),
                ]),
            ),
            ("nested", map(vec![("a", map(vec![("b", 1i64.into())]))])),
        ]);

        let pairs: Vec<_> = flatten(&value, recursive()).collect();
        let rebuilt = unflatten(pairs, NO_EXCLUSIONS, ".");
        assert_eq!(AttributeValue::Map(rebuilt), value);
    }

    #[test]
    fn test_has_mapping() {
        assert!(!has_mapping(&[]));
        assert!(!has_mapping(&[1i64.into(), "x".into()]));
        assert!(has_mapping(&[1i64.into(), map(vec![])]));
    }

    #[test]
    fn test_lossless_keeps_scalars_in_split_sequence() {
        let value = map(vec![(
            "prompts",
            AttributeValue::List(vec!["hi".into(), map(vec![("x", 1i64.into())])]),
        )]);
        let pairs: Vec<_> = flatten(&value, recursive().with_lossless(true)).collect();
        assert_eq!(
            pairs,
            vec![
                ("prompts.0".to_string(), AttributeValue::from("hi")),
                ("prompts.1.x".to_string(), AttributeValue::Int(1)),
            ]
        );
        let rebuilt = unflatten(pairs, NO_EXCLUSIONS, ".");
        assert_eq!(AttributeValue::Map(rebuilt), value);
    }

    #[test]
    fn test_lossless_keeps_ambiguous_mappings_whole() {
        let numeric = map(vec![("0", "a".into())]);
        let dotted = map(vec![("k.v", 1i64.into())]);
        let value = map(vec![
            ("x", numeric.clone()),
            ("y", dotted.clone()),
            ("z", map(vec![("plain", true.into())])),
        ]);
        let pairs: Vec<_> = flatten(&value, recursive().with_lossless(true)).collect();
        assert_eq!(
            pairs,
            vec![
                ("x".to_string(), numeric),
                ("y".to_string(), dotted),
                ("z.plain".to_string(), AttributeValue::Bool(true)),
            ]
        );
        let rebuilt = unflatten(pairs, NO_EXCLUSIONS, ".");
        assert_eq!(AttributeValue::Map(rebuilt), value);
    }

    #[test]
    fn test_ambiguous_mappings_split_by_default() {
        let value = map(vec![("x", map(vec![("0", "a".into())]))]);
        let pairs: Vec<_> = flatten(&value, recursive()).collect();
        assert_eq!(pairs, vec![("x.0".to_string(), AttributeValue::from("a"))]);
    }
}
