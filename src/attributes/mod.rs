//! Attribute codec
//!
//! Converts between flat `(dotted_key, value)` pairs, the shape attributes
//! take on the wire, and the nested maps/lists application code works with.

pub mod flatten;
pub mod json;
pub mod trie;
pub mod value;

pub use flatten::{flatten, flatten_map, has_mapping, Flatten, FlattenOptions};
pub use json::{load_json_strings, parse_json_object};
pub use trie::{unflatten, AttributeTrie, PathSegment};
pub use value::{get_attribute_value, AttributeMap, AttributeValue};
