//! OpenTelemetry span transcoding
//!
//! Converts OTLP `Span` messages to and from the nested [`Span`] model.
//! Flat wire attributes such as
//!
//! ```text
//! retrieval.documents.0.document.id    = "doc-a"
//! retrieval.documents.0.document.score = 0.92
//! llm.token_count.total                = 12
//! ```
//!
//! decode into
//!
//! ```text
//! {
//!   "retrieval": {"documents": [{"document": {"id": "doc-a", "score": 0.92}}]},
//!   "llm": {"token_count": {"total": 12}}
//! }
//! ```
//!
//! and encode back to the same flat keys. OpenInference convention names
//! (see [`semconv`]) are treated as atomic prefixes while decoding.

mod config;
mod ids;
mod model;
pub mod proto;
pub mod semconv;
mod transcode;

pub use config::CodecConfig;
pub use ids::{IdError, SpanId, TraceId};
pub use model::{Span, SpanContext, SpanEvent, SpanException, SpanKind, SpanStatusCode};
pub use transcode::{
    decode_any_value, decode_span, encode_span, encode_value, CodecError, Transcoder,
};
