//! Internal span model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{SpanId, TraceId};
use crate::attributes::{get_attribute_value, AttributeMap, AttributeValue};

/// OpenInference span kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    Llm,
    Chain,
    Tool,
    Retriever,
    Embedding,
    Agent,
    Reranker,
    Guardrail,
    Evaluator,
    #[default]
    Unknown,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Llm => "LLM",
            SpanKind::Chain => "CHAIN",
            SpanKind::Tool => "TOOL",
            SpanKind::Retriever => "RETRIEVER",
            SpanKind::Embedding => "EMBEDDING",
            SpanKind::Agent => "AGENT",
            SpanKind::Reranker => "RERANKER",
            SpanKind::Guardrail => "GUARDRAIL",
            SpanKind::Evaluator => "EVALUATOR",
            SpanKind::Unknown => "UNKNOWN",
        }
    }

    /// Parse the `openinference.span.kind` attribute. Case-insensitive;
    /// anything unrecognized is `Unknown`.
    pub fn from_attribute(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "LLM" => SpanKind::Llm,
            "CHAIN" => SpanKind::Chain,
            "TOOL" => SpanKind::Tool,
            "RETRIEVER" => SpanKind::Retriever,
            "EMBEDDING" => SpanKind::Embedding,
            "AGENT" => SpanKind::Agent,
            "RERANKER" => SpanKind::Reranker,
            "GUARDRAIL" => SpanKind::Guardrail,
            "EVALUATOR" => SpanKind::Evaluator,
            _ => SpanKind::Unknown,
        }
    }
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

impl SpanStatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatusCode::Unset => "UNSET",
            SpanStatusCode::Ok => "OK",
            SpanStatusCode::Error => "ERROR",
        }
    }

    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => SpanStatusCode::Ok,
            2 => SpanStatusCode::Error,
            _ => SpanStatusCode::Unset,
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            SpanStatusCode::Unset => 0,
            SpanStatusCode::Ok => 1,
            SpanStatusCode::Error => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

/// An exception recorded on a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanException {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub exception_type: Option<String>,
    pub exception_escaped: Option<bool>,
    pub exception_stacktrace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpanEvent {
    Event {
        name: String,
        timestamp: DateTime<Utc>,
        attributes: AttributeMap,
    },
    Exception(SpanException),
}

impl SpanEvent {
    pub fn name(&self) -> &str {
        match self {
            SpanEvent::Event { name, .. } => name,
            SpanEvent::Exception(_) => super::semconv::EXCEPTION_EVENT_NAME,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SpanEvent::Event { timestamp, .. } => *timestamp,
            SpanEvent::Exception(exception) => exception.timestamp,
        }
    }
}

/// A decoded span with nested attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub name: String,
    pub context: SpanContext,
    /// `None` for a root span
    pub parent_id: Option<SpanId>,
    pub span_kind: SpanKind,
    pub start_time: DateTime<Utc>,
    /// `None` while the span is still open
    pub end_time: Option<DateTime<Utc>>,
    pub status_code: SpanStatusCode,
    pub status_message: String,
    pub attributes: AttributeMap,
    pub events: Vec<SpanEvent>,
}

impl Span {
    pub fn new(
        name: impl Into<String>,
        context: SpanContext,
        span_kind: SpanKind,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            context,
            parent_id: None,
            span_kind,
            start_time,
            end_time: None,
            status_code: SpanStatusCode::Unset,
            status_message: String::new(),
            attributes: AttributeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: SpanId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_status(mut self, code: SpanStatusCode, message: impl Into<String>) -> Self {
        self.status_code = code;
        self.status_message = message.into();
        self
    }

    pub fn with_attributes(mut self, attributes: AttributeMap) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_events(mut self, events: Vec<SpanEvent>) -> Self {
        self.events = events;
        self
    }

    /// Look up a nested attribute by dotted path, e.g. `llm.token_count.total`.
    pub fn attribute(&self, dotted_key: &str) -> Option<&AttributeValue> {
        get_attribute_value(&self.attributes, dotted_key, ".")
    }

    /// Wall time between start and end, `None` while the span is open.
    pub fn latency(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
