//! Spanweave: attribute codec and OTLP transcoder for LLM traces
//!
//! OpenTelemetry carries span attributes as a flat list of dotted keys.
//! LLM instrumentation (OpenInference) packs whole structures into those
//! keys: retrieved documents, chat messages, embedding vectors. This crate
//! converts between the flat wire form and nested attribute trees.
//!
//! # Features
//!
//! - **Trie Unflatten**: Rebuilds maps and lists from dotted keys, with
//!   reserved prefixes kept atomic
//! - **Lazy Flatten**: Streams nested attributes back out as dotted pairs
//! - **JSON-String Attributes**: Metadata-like maps travel as one JSON string
//! - **OTLP Transcoding**: Lossless `Span` <-> protobuf round trips,
//!   including NaN floats and empty containers
//!
//! # Example
//!
//! ```no_run
//! use spanweave::attributes::{flatten_map, unflatten, AttributeValue, FlattenOptions};
//! use spanweave::otel::semconv::semantic_conventions;
//!
//! let pairs = vec![
//!     ("retrieval.documents.0.document.id", AttributeValue::from("a")),
//!     ("retrieval.documents.1.document.id", AttributeValue::from("b")),
//! ];
//! let nested = unflatten(pairs, semantic_conventions(), ".");
//!
//! let options = FlattenOptions::new().with_recurse_on_sequence(true);
//! for (key, value) in flatten_map(&nested, options) {
//!     println!("{} = {}", key, value);
//! }
//! ```

pub mod attributes;
pub mod otel;

// Re-export commonly used types
pub use attributes::{flatten, unflatten, AttributeMap, AttributeValue, FlattenOptions};
pub use otel::{CodecConfig, CodecError, Span, SpanKind, Transcoder};
