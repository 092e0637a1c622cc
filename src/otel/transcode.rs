//! OTLP span <-> internal span
//!
//! Decoding is best-effort: odd identifier widths, unknown status codes,
//! null values and unparseable JSON strings never fail a span. Encoding is
//! strict and reports timestamps that do not fit the wire format.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use prost::Message;

use super::config::CodecConfig;
use super::ids::{SpanId, TraceId};
use super::model::{Span, SpanContext, SpanEvent, SpanException, SpanKind, SpanStatusCode};
use super::proto;
use super::semconv::{
    match_convention, EXCEPTION_ESCAPED, EXCEPTION_EVENT_NAME, EXCEPTION_MESSAGE,
    EXCEPTION_STACKTRACE, EXCEPTION_TYPE, OPENINFERENCE_SPAN_KIND,
};
use crate::attributes::{
    flatten_map, load_json_strings, unflatten, AttributeMap, AttributeValue, FlattenOptions,
    PathSegment,
};

const SCOPE_NAME: &str = "spanweave";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{field} timestamp {timestamp} cannot be encoded as unix nanoseconds")]
    TimestampOutOfRange {
        field: &'static str,
        timestamp: DateTime<Utc>,
    },

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Converts spans between the OTLP wire form and [`Span`]
#[derive(Debug, Clone)]
pub struct Transcoder {
    config: CodecConfig,
    conventions: Vec<String>,
    flatten_options: FlattenOptions,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

impl Transcoder {
    pub fn new(config: CodecConfig) -> Self {
        let conventions = config.conventions();
        let flatten_options = FlattenOptions::new()
            .with_separator(config.separator.clone())
            .with_recurse_on_sequence(true)
            .with_json_string_attributes(config.json_string_attributes.iter().cloned())
            .with_lossless(true);
        Self {
            config,
            conventions,
            flatten_options,
        }
    }

    /// Decode one wire span. Never fails.
    pub fn decode(&self, wire: &proto::Span) -> Span {
        let context = SpanContext {
            trace_id: TraceId::from_bytes(&wire.trace_id),
            span_id: SpanId::from_bytes(&wire.span_id),
        };

        let mut pairs = decode_key_values(&wire.attributes);
        let span_kind = take_span_kind(&mut pairs);
        let attributes = self.reconstitute(pairs);

        let (status_code, status_message) = match &wire.status {
            Some(status) => (SpanStatusCode::from_i32(status.code), status.message.clone()),
            None => (SpanStatusCode::Unset, String::new()),
        };

        let events = wire.events.iter().map(|event| self.decode_event(event)).collect();

        Span {
            name: wire.name.clone(),
            context,
            parent_id: SpanId::from_parent_bytes(&wire.parent_span_id),
            span_kind,
            start_time: from_unix_nanos(wire.start_time_unix_nano),
            end_time: match wire.end_time_unix_nano {
                0 => None,
                nanos => Some(from_unix_nanos(nanos)),
            },
            status_code,
            status_message,
            attributes,
            events,
        }
    }

    /// Encode one span into its wire form.
    pub fn encode(&self, span: &Span) -> Result<proto::Span, CodecError> {
        let mut attributes: Vec<proto::KeyValue> = self
            .flatten(&span.attributes)
            .filter(|(key, _)| key != OPENINFERENCE_SPAN_KIND)
            .map(|(key, value)| encode_key_value(key, &value))
            .collect();
        attributes.push(encode_key_value(
            OPENINFERENCE_SPAN_KIND.to_string(),
            &AttributeValue::from(span.span_kind.as_str()),
        ));

        let events = span
            .events
            .iter()
            .map(|event| self.encode_event(event))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(proto::Span {
            trace_id: span.context.trace_id.to_bytes().to_vec(),
            span_id: span.context.span_id.to_bytes().to_vec(),
            parent_span_id: span
                .parent_id
                .map(|id| id.to_bytes().to_vec())
                .unwrap_or_default(),
            name: span.name.clone(),
            kind: proto::span::SpanKind::Internal as i32,
            start_time_unix_nano: to_unix_nanos("start", span.start_time)?,
            end_time_unix_nano: match span.end_time {
                Some(end) => to_unix_nanos("end", end)?,
                None => 0,
            },
            attributes,
            events,
            status: Some(proto::Status {
                message: span.status_message.clone(),
                code: span.status_code.to_i32(),
            }),
            ..Default::default()
        })
    }

    /// Decode every span in an export payload, in payload order.
    pub fn decode_traces_data(&self, data: &proto::TracesData) -> Vec<Span> {
        let spans: Vec<Span> = data
            .resource_spans
            .iter()
            .flat_map(|resource| resource.scope_spans.iter())
            .flat_map(|scope| scope.spans.iter())
            .map(|span| self.decode(span))
            .collect();
        tracing::debug!(
            "Decoded {} spans from {} resource groups",
            spans.len(),
            data.resource_spans.len()
        );
        spans
    }

    /// Wrap spans into a single-resource, single-scope export payload.
    pub fn wrap_traces_data(&self, spans: &[Span]) -> Result<proto::TracesData, CodecError> {
        let spans = spans
            .iter()
            .map(|span| self.encode(span))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(proto::TracesData {
            resource_spans: vec![proto::ResourceSpans {
                resource: Some(proto::Resource::default()),
                scope_spans: vec![proto::ScopeSpans {
                    scope: Some(proto::InstrumentationScope {
                        name: SCOPE_NAME.to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        ..Default::default()
                    }),
                    spans,
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        })
    }

    pub fn decode_span_bytes(&self, bytes: &[u8]) -> Result<Span, CodecError> {
        let wire = proto::Span::decode(bytes)?;
        Ok(self.decode(&wire))
    }

    pub fn encode_span_bytes(&self, span: &Span) -> Result<Vec<u8>, CodecError> {
        Ok(self.encode(span)?.encode_to_vec())
    }

    fn flatten<'a>(
        &self,
        attributes: &'a AttributeMap,
    ) -> impl Iterator<Item = (String, AttributeValue)> + 'a {
        flatten_map(attributes, self.flatten_options.clone())
    }

    /// Rebuild nested attributes from decoded flat pairs.
    ///
    /// Keys extending a convention prefix are grouped first. A group whose
    /// next segments are all indices becomes a list of per-index maps; any
    /// other group becomes a single map. The groups are spliced back at
    /// their prefix and unflattened together with the ungrouped keys.
    fn reconstitute(&self, pairs: Vec<(String, AttributeValue)>) -> AttributeMap {
        let separator = self.config.separator.as_str();
        let json_attributes = self.config.json_string_attributes.as_slice();

        let mut groups: BTreeMap<usize, Vec<(String, AttributeValue)>> = BTreeMap::new();
        let mut remaining = Vec::new();
        for (key, value) in load_json_strings(pairs, json_attributes, separator) {
            let matched = match_convention(&key, &self.conventions, separator)
                .map(|(index, rest)| (index, rest.to_string()));
            match matched {
                Some((index, rest)) => groups.entry(index).or_default().push((rest, value)),
                None => remaining.push((key, value)),
            }
        }

        // Ungrouped keys go last so a raw value at a prefix wins over its group
        let mut spliced = Vec::with_capacity(groups.len() + remaining.len());
        for (index, members) in groups {
            let value = if is_list_shaped(&members, separator) {
                self.rebuild_list(members)
            } else {
                AttributeValue::Map(unflatten(members, &self.conventions, separator))
            };
            spliced.push((self.conventions[index].clone(), value));
        }
        spliced.extend(remaining);
        unflatten(spliced, &self.conventions, separator)
    }

    fn rebuild_list(&self, members: Vec<(String, AttributeValue)>) -> AttributeValue {
        let separator = self.config.separator.as_str();
        let mut by_index: BTreeMap<u64, (Option<AttributeValue>, Vec<(String, AttributeValue)>)> =
            BTreeMap::new();
        for (rest, value) in members {
            let (head, tail) = match rest.split_once(separator) {
                Some((head, tail)) => (head, Some(tail)),
                None => (rest.as_str(), None),
            };
            let PathSegment::Index(index) = PathSegment::parse(head) else {
                continue;
            };
            let slot = by_index.entry(index).or_default();
            match tail {
                Some(tail) => slot.1.push((tail.to_string(), value)),
                None => slot.0 = Some(value),
            }
        }
        AttributeValue::List(
            by_index
                .into_values()
                .map(|(bare, nested)| match bare {
                    Some(value) => value,
                    None => AttributeValue::Map(unflatten(nested, &self.conventions, separator)),
                })
                .collect(),
        )
    }

    fn decode_event(&self, event: &proto::span::Event) -> SpanEvent {
        let timestamp = from_unix_nanos(event.time_unix_nano);
        let pairs = decode_key_values(&event.attributes);
        if event.name == EXCEPTION_EVENT_NAME {
            return SpanEvent::Exception(decode_exception(timestamp, pairs));
        }
        SpanEvent::Event {
            name: event.name.clone(),
            timestamp,
            attributes: self.reconstitute(pairs),
        }
    }

    fn encode_event(&self, event: &SpanEvent) -> Result<proto::span::Event, CodecError> {
        let attributes = match event {
            SpanEvent::Event { attributes, .. } => self
                .flatten(attributes)
                .map(|(key, value)| encode_key_value(key, &value))
                .collect(),
            SpanEvent::Exception(exception) => encode_exception(exception),
        };
        Ok(proto::span::Event {
            time_unix_nano: to_unix_nanos("event", event.timestamp())?,
            name: event.name().to_string(),
            attributes,
            dropped_attributes_count: 0,
        })
    }
}

fn default_transcoder() -> &'static Transcoder {
    static TRANSCODER: OnceLock<Transcoder> = OnceLock::new();
    TRANSCODER.get_or_init(Transcoder::default)
}

/// Decode with the default configuration.
pub fn decode_span(wire: &proto::Span) -> Span {
    default_transcoder().decode(wire)
}

/// Encode with the default configuration.
pub fn encode_span(span: &Span) -> Result<proto::Span, CodecError> {
    default_transcoder().encode(span)
}

/// Convert a wire value. An unset union is `None`.
pub fn decode_any_value(value: &proto::AnyValue) -> Option<AttributeValue> {
    use proto::any_value::Value;

    match value.value.as_ref()? {
        Value::StringValue(s) => Some(AttributeValue::String(s.clone())),
        Value::BoolValue(b) => Some(AttributeValue::Bool(*b)),
        Value::IntValue(i) => Some(AttributeValue::Int(*i)),
        Value::DoubleValue(d) => Some(AttributeValue::Float(*d)),
        Value::ArrayValue(array) => Some(AttributeValue::List(
            array.values.iter().filter_map(decode_any_value).collect(),
        )),
        Value::KvlistValue(list) => Some(AttributeValue::Map(
            decode_key_values(&list.values).into_iter().collect(),
        )),
        Value::BytesValue(bytes) => Some(AttributeValue::Bytes(bytes.clone())),
    }
}

/// Convert a value into the wire union. Maps become key-value lists.
pub fn encode_value(value: &AttributeValue) -> proto::AnyValue {
    use proto::any_value::Value;

    let value = match value {
        AttributeValue::String(s) => Value::StringValue(s.clone()),
        AttributeValue::Bool(b) => Value::BoolValue(*b),
        AttributeValue::Int(i) => Value::IntValue(*i),
        AttributeValue::Float(f) => Value::DoubleValue(*f),
        AttributeValue::List(items) => Value::ArrayValue(proto::ArrayValue {
            values: items.iter().map(encode_value).collect(),
        }),
        AttributeValue::Bytes(bytes) => Value::BytesValue(bytes.clone()),
        AttributeValue::Map(map) => Value::KvlistValue(proto::KeyValueList {
            values: map
                .iter()
                .map(|(key, value)| encode_key_value(key.clone(), value))
                .collect(),
        }),
    };
    proto::AnyValue { value: Some(value) }
}

fn encode_key_value(key: String, value: &AttributeValue) -> proto::KeyValue {
    proto::KeyValue {
        key,
        value: Some(encode_value(value)),
    }
}

fn decode_key_values(values: &[proto::KeyValue]) -> Vec<(String, AttributeValue)> {
    values
        .iter()
        .filter_map(|kv| {
            let value = decode_any_value(kv.value.as_ref()?)?;
            Some((kv.key.clone(), value))
        })
        .collect()
}

/// Remove the span kind attribute. The last occurrence decides the kind.
fn take_span_kind(pairs: &mut Vec<(String, AttributeValue)>) -> SpanKind {
    let mut kind = None;
    pairs.retain(|(key, value)| {
        if key != OPENINFERENCE_SPAN_KIND {
            return true;
        }
        kind = Some(value.as_str().map(SpanKind::from_attribute).unwrap_or_default());
        false
    });
    kind.unwrap_or_default()
}

fn decode_exception(timestamp: DateTime<Utc>, pairs: Vec<(String, AttributeValue)>) -> SpanException {
    let mut exception = SpanException {
        timestamp,
        message: String::new(),
        exception_type: None,
        exception_escaped: None,
        exception_stacktrace: None,
    };
    for (key, value) in pairs {
        match key.as_str() {
            EXCEPTION_MESSAGE => exception.message = text(value),
            EXCEPTION_TYPE => exception.exception_type = Some(text(value)),
            EXCEPTION_STACKTRACE => exception.exception_stacktrace = Some(text(value)),
            EXCEPTION_ESCAPED => {
                exception.exception_escaped = match value {
                    AttributeValue::Bool(b) => Some(b),
                    AttributeValue::String(s) => s.parse().ok(),
                    _ => None,
                }
            }
            _ => {}
        }
    }
    exception
}

fn encode_exception(exception: &SpanException) -> Vec<proto::KeyValue> {
    let mut attributes = vec![encode_key_value(
        EXCEPTION_MESSAGE.to_string(),
        &AttributeValue::from(exception.message.as_str()),
    )];
    if let Some(kind) = &exception.exception_type {
        attributes.push(encode_key_value(EXCEPTION_TYPE.to_string(), &kind.as_str().into()));
    }
    if let Some(escaped) = exception.exception_escaped {
        attributes.push(encode_key_value(EXCEPTION_ESCAPED.to_string(), &escaped.into()));
    }
    if let Some(stacktrace) = &exception.exception_stacktrace {
        attributes.push(encode_key_value(
            EXCEPTION_STACKTRACE.to_string(),
            &stacktrace.as_str().into(),
        ));
    }
    attributes
}

fn text(value: AttributeValue) -> String {
    match value {
        AttributeValue::String(s) => s,
        other => other.to_string(),
    }
}

fn is_list_shaped(members: &[(String, AttributeValue)], separator: &str) -> bool {
    members.iter().all(|(rest, _)| {
        let head = rest.split_once(separator).map_or(rest.as_str(), |(head, _)| head);
        matches!(PathSegment::parse(head), PathSegment::Index(_))
    })
}

fn from_unix_nanos(nanos: u64) -> DateTime<Utc> {
    let nanos = i64::try_from(nanos).unwrap_or_else(|_| {
        tracing::debug!("Clamping timestamp {} to the representable range", nanos);
        i64::MAX
    });
    Utc.timestamp_nanos(nanos)
}

fn to_unix_nanos(field: &'static str, timestamp: DateTime<Utc>) -> Result<u64, CodecError> {
    timestamp
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .ok_or(CodecError::TimestampOutOfRange { field, timestamp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::get_attribute_value;

    fn string(s: &str) -> proto::AnyValue {
        encode_value(&AttributeValue::from(s))
    }

    fn kv(key: &str, value: proto::AnyValue) -> proto::KeyValue {
        proto::KeyValue {
            key: key.to_string(),
            value: Some(value),
        }
    }

    fn wire_span(attributes: Vec<proto::KeyValue>) -> proto::Span {
        proto::Span {
            trace_id: (1..=16).collect(),
            span_id: vec![0, 0, 0, 0, 0, 0, 0, 7],
            parent_span_id: vec![0, 0, 0, 0, 0, 0, 0, 3],
            name: "query".to_string(),
            kind: proto::span::SpanKind::Internal as i32,
            start_time_unix_nano: 1_700_000_000_000_000_001,
            end_time_unix_nano: 1_700_000_000_500_000_000,
            attributes,
            status: Some(proto::Status {
                message: String::new(),
                code: 1,
            }),
            ..Default::default()
        }
    }

    fn map(entries: Vec<(&str, AttributeValue)>) -> AttributeValue {
        AttributeValue::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn retriever_span() -> Span {
        let wire = wire_span(vec![
            kv(OPENINFERENCE_SPAN_KIND, string("RETRIEVER")),
            kv("input.value", string("what is a trie?")),
            kv("retrieval.documents.0.document.id", string("doc-a")),
            kv("retrieval.documents.0.document.score", encode_value(&0.92.into())),
            kv(
                "retrieval.documents.0.document.metadata",
                string(r#"{"source": "wiki", "page": 3}"#),
            ),
            kv("retrieval.documents.1.document.id", string("doc-b")),
            kv("retrieval.documents.1.document.score", encode_value(&0.41.into())),
            kv(
                "retrieval.documents.1.document.metadata",
                string(r#"{"source": "blog", "tags": ["x", "y"]}"#),
            ),
            kv(
                "embedding.embeddings.0.embedding.vector",
                encode_value(&AttributeValue::List(vec![0.1.into(), 0.2.into()])),
            ),
            kv(
                "embedding.embeddings.1.embedding.vector",
                encode_value(&AttributeValue::List(vec![0.3.into(), f64::NAN.into()])),
            ),
            kv("llm.model_name", string("gpt")),
            kv("llm.token_count.total", encode_value(&AttributeValue::Int(12))),
        ]);
        decode_span(&wire)
    }

    #[test]
    fn test_decode_reconstitutes_documents() {
        let span = retriever_span();
        assert_eq!(span.span_kind, SpanKind::Retriever);
        assert_eq!(span.status_code, SpanStatusCode::Ok);
        assert_eq!(span.parent_id, Some(SpanId::from_u64(3)));
        assert_eq!(span.context.span_id, SpanId::from_u64(7));
        assert!(span.attributes.get(OPENINFERENCE_SPAN_KIND).is_none());
        assert!(span.attributes.get("openinference").is_none());

        let documents = span.attribute("retrieval.documents").unwrap().as_list().unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(
            documents[0],
            map(vec![(
                "document",
                map(vec![
                    ("id", "doc-a".into()),
                    ("score", 0.92.into()),
                    ("metadata", map(vec![("source", "wiki".into()), ("page", AttributeValue::Int(3))])),
                ])
            )])
        );
        let tags = get_attribute_value(
            documents[1].as_map().unwrap(),
            "document.metadata.tags",
            ".",
        );
        assert_eq!(tags, Some(&AttributeValue::List(vec!["x".into(), "y".into()])));

        assert_eq!(span.attribute("llm.model_name"), Some(&AttributeValue::from("gpt")));
        assert_eq!(span.attribute("llm.token_count.total"), Some(&AttributeValue::Int(12)));
        assert_eq!(span.attribute("input.value"), Some(&AttributeValue::from("what is a trie?")));
    }

    #[test]
    fn test_span_round_trip() {
        let span = retriever_span();
        let wire = encode_span(&span).unwrap();
        let metadata = wire
            .attributes
            .iter()
            .find(|kv| kv.key == "retrieval.documents.0.document.metadata")
            .unwrap();
        assert!(matches!(
            metadata.value.as_ref().unwrap().value,
            Some(proto::any_value::Value::StringValue(_))
        ));

        let decoded = decode_span(&wire);
        assert_eq!(decoded, span);

        let embeddings = decoded.attribute("embedding.embeddings").unwrap().as_list().unwrap();
        let vector = get_attribute_value(embeddings[1].as_map().unwrap(), "embedding.vector", ".")
            .unwrap()
            .as_list()
            .unwrap();
        assert!(vector[1].as_f64().unwrap().is_nan());
    }

    #[test]
    fn test_round_trip_adversarial_nesting() {
        let attributes: AttributeMap = [
            ("empty_list".to_string(), AttributeValue::List(vec![])),
            ("empty_map".to_string(), map(vec![])),
            ("nan".to_string(), f64::NAN.into()),
            ("raw".to_string(), AttributeValue::Bytes(vec![0, 255])),
            (
                "nested".to_string(),
                AttributeValue::List(vec![
                    map(vec![(
                        "inner",
                        AttributeValue::List(vec![
                            map(vec![("leaf", AttributeValue::List(vec![1i64.into(), 2i64.into()]))]),
                            map(vec![]),
                        ]),
                    )]),
                    map(vec![("plain", AttributeValue::List(vec![AttributeValue::List(vec![])]))]),
                ]),
            ),
            (
                "grid".to_string(),
                AttributeValue::List(vec![AttributeValue::List(vec![map(vec![("k", true.into())])])]),
            ),
        ]
        .into_iter()
        .collect();

        let context = SpanContext {
            trace_id: TraceId::from_u128(42),
            span_id: SpanId::from_u64(42),
        };
        let span = Span::new("chain", context, SpanKind::Chain, Utc.timestamp_nanos(10))
            .with_attributes(attributes)
            .with_end_time(Utc.timestamp_nanos(20));

        let bytes = encode_span_bytes_default(&span);
        let decoded = default_transcoder().decode_span_bytes(&bytes).unwrap();
        assert_eq!(decoded, span);
    }

    fn encode_span_bytes_default(span: &Span) -> Vec<u8> {
        default_transcoder().encode_span_bytes(span).unwrap()
    }

    #[test]
    fn test_unknown_status_and_missing_kind() {
        let mut wire = wire_span(vec![kv("a", string("b"))]);
        wire.status = Some(proto::Status {
            message: "?".into(),
            code: 9,
        });
        let span = decode_span(&wire);
        assert_eq!(span.status_code, SpanStatusCode::Unset);
        assert_eq!(span.status_message, "?");
        assert_eq!(span.span_kind, SpanKind::Unknown);

        wire.status = None;
        assert_eq!(decode_span(&wire).status_code, SpanStatusCode::Unset);
    }

    #[test]
    fn test_unset_values_are_skipped() {
        let wire = wire_span(vec![
            kv("present", string("x")),
            kv("null", proto::AnyValue { value: None }),
            proto::KeyValue {
                key: "missing".into(),
                value: None,
            },
            kv(
                "list",
                proto::AnyValue {
                    value: Some(proto::any_value::Value::ArrayValue(proto::ArrayValue {
                        values: vec![string("a"), proto::AnyValue { value: None }],
                    })),
                },
            ),
        ]);
        let span = decode_span(&wire);
        assert_eq!(span.attributes.len(), 2);
        assert_eq!(span.attribute("list"), Some(&AttributeValue::List(vec!["a".into()])));
    }

    #[test]
    fn test_end_time_zero_is_open() {
        let mut wire = wire_span(vec![]);
        wire.end_time_unix_nano = 0;
        wire.parent_span_id = vec![];
        let span = decode_span(&wire);
        assert_eq!(span.end_time, None);
        assert_eq!(span.parent_id, None);

        let encoded = encode_span(&span).unwrap();
        assert_eq!(encoded.end_time_unix_nano, 0);
        assert!(encoded.parent_span_id.is_empty());
    }

    #[test]
    fn test_odd_identifier_lengths() {
        let mut wire = wire_span(vec![]);
        wire.trace_id = vec![1, 2, 3];
        wire.span_id = vec![];
        let a = decode_span(&wire);
        let b = decode_span(&wire);
        assert_eq!(a.context, b.context);

        // Re-encoding emits the canonical widths
        let encoded = encode_span(&a).unwrap();
        assert_eq!(encoded.trace_id.len(), 16);
        assert_eq!(encoded.span_id.len(), 8);
    }

    #[test]
    fn test_exception_events() {
        let mut wire = wire_span(vec![]);
        wire.events = vec![
            proto::span::Event {
                time_unix_nano: 5,
                name: "exception".into(),
                attributes: vec![
                    kv(EXCEPTION_TYPE, string("ValueError")),
                    kv(EXCEPTION_ESCAPED, encode_value(&true.into())),
                ],
                dropped_attributes_count: 0,
            },
            proto::span::Event {
                time_unix_nano: 6,
                name: "first_token".into(),
                attributes: vec![kv("llm.token_count.prompt", encode_value(&AttributeValue::Int(4)))],
                dropped_attributes_count: 0,
            },
        ];
        let span = decode_span(&wire);
        match &span.events[0] {
            SpanEvent::Exception(exception) => {
                assert_eq!(exception.message, "");
                assert_eq!(exception.exception_type.as_deref(), Some("ValueError"));
                assert_eq!(exception.exception_escaped, Some(true));
                assert_eq!(exception.exception_stacktrace, None);
            }
            other => panic!("expected exception, got {:?}", other),
        }
        match &span.events[1] {
            SpanEvent::Event { name, attributes, .. } => {
                assert_eq!(name, "first_token");
                assert_eq!(
                    get_attribute_value(attributes, "llm.token_count.prompt", "."),
                    Some(&AttributeValue::Int(4))
                );
            }
            other => panic!("expected event, got {:?}", other),
        }

        let decoded = decode_span(&encode_span(&span).unwrap());
        assert_eq!(decoded.events, span.events);
    }

    #[test]
    fn test_invalid_json_metadata_stays_raw() {
        let span = decode_span(&wire_span(vec![kv(
            "retrieval.documents.0.document.metadata",
            string("{broken"),
        )]));
        let documents = span.attribute("retrieval.documents").unwrap().as_list().unwrap();
        assert_eq!(
            get_attribute_value(documents[0].as_map().unwrap(), "document.metadata", "."),
            Some(&AttributeValue::from("{broken"))
        );
    }

    #[test]
    fn test_map_shaped_convention_prefix() {
        let span = decode_span(&wire_span(vec![
            kv("llm.invocation_parameters.temperature", encode_value(&0.5.into())),
            kv("llm.invocation_parameters.0", string("zero")),
        ]));
        let params = span.attribute("llm.invocation_parameters").unwrap().as_map().unwrap();
        assert_eq!(params.get("temperature"), Some(&AttributeValue::Float(0.5)));
        assert_eq!(params.get("0"), Some(&AttributeValue::from("zero")));
    }

    #[test]
    fn test_pre_epoch_timestamp_fails_encode() {
        let context = SpanContext {
            trace_id: TraceId::from_u128(1),
            span_id: SpanId::from_u64(1),
        };
        let span = Span::new("old", context, SpanKind::Llm, Utc.timestamp_nanos(-1));
        assert!(matches!(
            encode_span(&span),
            Err(CodecError::TimestampOutOfRange { field: "start", .. })
        ));
    }

    #[test]
    fn test_traces_data_wrapping() {
        let span = retriever_span();
        let transcoder = Transcoder::default();
        let data = transcoder.wrap_traces_data(&[span.clone(), span.clone()]).unwrap();
        assert_eq!(data.resource_spans[0].scope_spans[0].spans.len(), 2);

        let bytes = data.encode_to_vec();
        let data = proto::TracesData::decode(bytes.as_slice()).unwrap();
        assert_eq!(transcoder.decode_traces_data(&data), vec![span.clone(), span]);
    }

    #[test]
    fn test_garbage_bytes_fail_decode() {
        let result = Transcoder::default().decode_span_bytes(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_mixed_scalar_and_mapping_lists_round_trip() {
        let span = decode_span(&wire_span(vec![
            kv("llm.prompts.0", string("hi")),
            kv("llm.prompts.1.x", encode_value(&AttributeValue::Int(1))),
            kv("foo.0", string("a")),
            kv("foo.1.y", encode_value(&AttributeValue::Int(2))),
        ]));
        assert_eq!(
            span.attribute("llm.prompts"),
            Some(&AttributeValue::List(vec![
                "hi".into(),
                map(vec![("x", AttributeValue::Int(1))]),
            ]))
        );
        assert_eq!(
            span.attribute("foo"),
            Some(&AttributeValue::List(vec![
                "a".into(),
                map(vec![("y", AttributeValue::Int(2))]),
            ]))
        );

        let wire = encode_span(&span).unwrap();
        assert!(wire.attributes.iter().any(|kv| kv.key == "llm.prompts.0"));
        assert_eq!(decode_span(&wire), span);
    }

    #[test]
    fn test_kvlist_with_ambiguous_keys_round_trips() {
        let kvlist = |entries: Vec<(&str, proto::AnyValue)>| proto::AnyValue {
            value: Some(proto::any_value::Value::KvlistValue(proto::KeyValueList {
                values: entries.into_iter().map(|(k, v)| kv(k, v)).collect(),
            })),
        };
        let array = proto::AnyValue {
            value: Some(proto::any_value::Value::ArrayValue(proto::ArrayValue {
                values: vec![kvlist(vec![("a.b", encode_value(&AttributeValue::Int(1)))])],
            })),
        };
        let span = decode_span(&wire_span(vec![
            kv("x", kvlist(vec![("0", string("a"))])),
            kv("rows", array),
        ]));
        assert_eq!(span.attribute("x"), Some(&map(vec![("0", "a".into())])));
        assert_eq!(
            span.attribute("rows"),
            Some(&AttributeValue::List(vec![map(vec![("a.b", AttributeValue::Int(1))])]))
        );

        let decoded = decode_span(&encode_span(&span).unwrap());
        assert_eq!(decoded, span);
    }

    #[test]
    fn test_very_deep_key_decodes_and_round_trips() {
        let key = vec!["a"; 20_000].join(".");
        let span = decode_span(&wire_span(vec![kv(&key, string("deep"))]));
        assert!(span.attributes.contains_key("a"));

        let wire = encode_span(&span).unwrap();
        // One deep attribute plus the span kind
        assert_eq!(wire.attributes.len(), 2);
        assert_eq!(decode_span(&wire), span);
    }

    #[test]
    fn test_transcoder_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Transcoder>();
    }
}
