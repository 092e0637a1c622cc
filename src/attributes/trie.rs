//! Prefix tree that rebuilds nested attributes from dotted keys
//!
//! Each key is split into path segments and absorbed into an arena of
//! nodes. Numeric segments start out as candidate array indices; a node
//! whose children are all indices renders as a list, anything else as a
//! map. A value set on a node always wins over index children.

use std::collections::{BTreeMap, BTreeSet};

use super::value::{AttributeMap, AttributeValue};

type NodeId = usize;

const ROOT: NodeId = 0;

/// Deepest path a key is split into. Past this the tail of the key is kept
/// as one segment so rendering stays within a bounded stack.
pub const MAX_DEPTH: usize = 100;

/// One step of a dotted path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    Index(u64),
    Key(String),
}

impl PathSegment {
    /// Parse a raw segment.
    ///
    /// Only canonical decimal numbers (`0`, `12`, not `012`) are indices,
    /// so rendering an index back to text reproduces the original segment.
    pub fn parse(raw: &str) -> Self {
        let canonical = !raw.is_empty()
            && raw.bytes().all(|b| b.is_ascii_digit())
            && (raw.len() == 1 || !raw.starts_with('0'));
        if canonical {
            if let Ok(index) = raw.parse::<u64>() {
                return PathSegment::Index(index);
            }
        }
        PathSegment::Key(raw.to_string())
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => write!(f, "{}", k),
        }
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    value: Option<AttributeValue>,
    /// Labels still eligible to become list positions
    indices: BTreeSet<u64>,
    /// Labels rendered as map keys; integer labels here never move back
    branches: BTreeSet<PathSegment>,
    children: BTreeMap<PathSegment, NodeId>,
}

/// Arena-backed trie used for a single unflatten pass
#[derive(Debug)]
pub struct AttributeTrie {
    nodes: Vec<TrieNode>,
    separator: String,
}

impl AttributeTrie {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            separator: separator.into(),
        }
    }

    fn child(&mut self, parent: NodeId, segment: PathSegment) -> NodeId {
        if let Some(&id) = self.nodes[parent].children.get(&segment) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(TrieNode::default());
        self.nodes[parent].children.insert(segment, id);
        id
    }

    fn set_value(&mut self, node: NodeId, value: AttributeValue) {
        let node = &mut self.nodes[node];
        node.value = Some(value);
        // A leaf cannot also be a list
        let demoted = std::mem::take(&mut node.indices);
        node.branches.extend(demoted.into_iter().map(PathSegment::Index));
    }

    fn add_index(&mut self, node: NodeId, index: u64) -> NodeId {
        let segment = PathSegment::Index(index);
        let entry = &mut self.nodes[node];
        if entry.value.is_some() || entry.branches.contains(&segment) {
            entry.branches.insert(segment.clone());
        } else {
            entry.indices.insert(index);
        }
        self.child(node, segment)
    }

    fn add_branch(&mut self, node: NodeId, segment: PathSegment) -> NodeId {
        let entry = &mut self.nodes[node];
        if let PathSegment::Index(index) = segment {
            entry.indices.remove(&index);
        }
        entry.branches.insert(segment.clone());
        self.child(node, segment)
    }

    /// Split off the next segment of `rest`.
    ///
    /// Exclusions are tried first, longest first, and must end on a
    /// separator boundary; the matched name becomes a single key segment.
    fn next_segment<'k, S: AsRef<str>>(
        &self,
        rest: &'k str,
        prefix_exclusions: &[S],
    ) -> (PathSegment, Option<&'k str>) {
        let sep = self.separator.as_str();
        if sep.is_empty() {
            return (PathSegment::parse(rest), None);
        }
        for exclusion in prefix_exclusions {
            let exclusion = exclusion.as_ref();
            if exclusion.is_empty() {
                continue;
            }
            if let Some(after) = rest.strip_prefix(exclusion) {
                if after.is_empty() {
                    return (PathSegment::Key(exclusion.to_string()), None);
                }
                if let Some(after) = after.strip_prefix(sep) {
                    return (PathSegment::Key(exclusion.to_string()), Some(after));
                }
            }
        }
        match rest.split_once(sep) {
            Some((head, tail)) => (PathSegment::parse(head), Some(tail)),
            None => (PathSegment::parse(rest), None),
        }
    }

    /// Absorb one dotted key. Re-inserting a key overwrites its value.
    pub fn insert<S: AsRef<str>>(
        &mut self,
        key: &str,
        value: AttributeValue,
        prefix_exclusions: &[S],
    ) {
        let mut node = ROOT;
        let mut rest = key;
        let mut depth = 0;
        loop {
            depth += 1;
            let capped = depth >= MAX_DEPTH
                && !self.separator.is_empty()
                && rest.contains(self.separator.as_str());
            let (segment, remainder) = if capped {
                tracing::debug!(
                    "Attribute key '{}' is deeper than {} segments, keeping the tail whole",
                    truncate(key, 64),
                    MAX_DEPTH
                );
                (PathSegment::Key(rest.to_string()), None)
            } else {
                self.next_segment(rest, prefix_exclusions)
            };
            node = match segment {
                PathSegment::Index(index) => self.add_index(node, index),
                key @ PathSegment::Key(_) => self.add_branch(node, key),
            };
            match remainder {
                Some(remainder) => rest = remainder,
                None => break,
            }
        }
        self.set_value(node, value);
    }

    /// Render the trie as a nested mapping, consuming it.
    pub fn into_map(mut self) -> AttributeMap {
        self.render_map(ROOT)
    }

    /// Render one node.
    ///
    /// A value wins over children. A node whose children are all indices
    /// becomes a list. A node that mixes index and named children becomes a
    /// map keyed by the decimal index labels instead of a list, so the named
    /// children are not dropped.
    fn render(&mut self, node: NodeId) -> AttributeValue {
        if let Some(value) = self.nodes[node].value.take() {
            return value;
        }
        let entry = &self.nodes[node];
        if !entry.indices.is_empty() && entry.branches.is_empty() {
            let children: Vec<NodeId> = entry
                .indices
                .iter()
                .filter_map(|i| entry.children.get(&PathSegment::Index(*i)).copied())
                .collect();
            return AttributeValue::List(children.into_iter().map(|c| self.render(c)).collect());
        }
        AttributeValue::Map(self.render_map(node))
    }

    fn render_map(&mut self, node: NodeId) -> AttributeMap {
        let children = std::mem::take(&mut self.nodes[node].children);
        let mut map = AttributeMap::new();
        for (segment, child) in children {
            let value = self.render(child);
            match segment {
                PathSegment::Index(index) => merge_path(&mut map, &[index.to_string()], value),
                PathSegment::Key(key) if self.separator.is_empty() => {
                    merge_path(&mut map, &[key], value)
                }
                PathSegment::Key(key) => {
                    let path: Vec<String> = key
                        .splitn(MAX_DEPTH, self.separator.as_str())
                        .map(str::to_string)
                        .collect();
                    merge_path(&mut map, &path, value)
                }
            }
        }
        map
    }
}

/// Place `value` at `path` inside `map`, merging with what is already there.
///
/// Maps merge key by key. Anything else is a value and takes precedence
/// over a map at the same position.
fn merge_path(map: &mut AttributeMap, path: &[String], value: AttributeValue) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        let merged = match map.remove(first) {
            Some(existing) => merge_values(existing, value),
            None => value,
        };
        map.insert(first.clone(), merged);
        return;
    }
    let entry = map
        .entry(first.clone())
        .or_insert_with(|| AttributeValue::Map(AttributeMap::new()));
    if let AttributeValue::Map(inner) = entry {
        merge_path(inner, rest, value);
    }
}

fn merge_values(existing: AttributeValue, incoming: AttributeValue) -> AttributeValue {
    match (existing, incoming) {
        (AttributeValue::Map(mut existing), AttributeValue::Map(incoming)) => {
            for (key, value) in incoming {
                merge_path(&mut existing, &[key], value);
            }
            AttributeValue::Map(existing)
        }
        (existing, AttributeValue::Map(_)) => existing,
        (_, incoming) => incoming,
    }
}

fn truncate(key: &str, max_chars: usize) -> &str {
    match key.char_indices().nth(max_chars) {
        Some((end, _)) => &key[..end],
        None => key,
    }
}

/// Rebuild a nested mapping from flat `(dotted_key, value)` pairs.
///
/// Pairs whose value is `None` are skipped. When the same key appears more
/// than once the last value wins; otherwise the result does not depend on
/// input order.
pub fn unflatten<I, K, V, S>(pairs: I, prefix_exclusions: &[S], separator: &str) -> AttributeMap
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Option<AttributeValue>>,
    S: AsRef<str>,
{
    let mut trie = AttributeTrie::new(separator);
    for (key, value) in pairs {
        if let Some(value) = value.into() {
            trie.insert(key.as_ref(), value, prefix_exclusions);
        }
    }
    trie.into_map()
}
