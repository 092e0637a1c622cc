//! Trace and span identifiers
//!
//! OTLP carries identifiers as 16-byte (trace) and 8-byte (span) strings.
//! Conversion from wire bytes is total: anything that is not the expected
//! width is folded into an identifier with a seeded hash instead of being
//! rejected.

use std::hash::Hasher;
use std::str::FromStr;

use fxhash::FxHasher64;
use serde::{Deserialize, Serialize};

const TRACE_ID_SEED_HIGH: u64 = 0x7472_6163_655f_6869;
const TRACE_ID_SEED_LOW: u64 = 0x7472_6163_655f_6c6f;
const SPAN_ID_SEED: u64 = 0x7370_616e_5f69_6400;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier '{0}' is not valid hex")]
    InvalidHex(String),

    #[error("Identifier '{value}' has {actual} hex digits, expected {expected}")]
    InvalidLength {
        value: String,
        expected: usize,
        actual: usize,
    },
}

fn seeded_hash(seed: u64, bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher64::default();
    hasher.write_u64(seed);
    hasher.write_usize(bytes.len());
    hasher.write(bytes);
    hasher.finish()
}

fn parse_hex(value: &str, expected: usize) -> Result<u128, IdError> {
    // UUID-formatted trace ids from older exports carry hyphens
    let digits: String = value.chars().filter(|c| *c != '-').collect();
    if digits.len() != expected {
        return Err(IdError::InvalidLength {
            value: value.to_string(),
            expected,
            actual: digits.len(),
        });
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IdError::InvalidHex(value.to_string()));
    }
    u128::from_str_radix(&digits, 16).map_err(|_| IdError::InvalidHex(value.to_string()))
}

/// 128-bit trace identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TraceId(u128);

impl TraceId {
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub const fn to_u128(self) -> u128 {
        self.0
    }

    /// Build from wire bytes. Exactly 16 bytes are read big-endian.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match <[u8; 16]>::try_from(bytes) {
            Ok(array) => Self(u128::from_be_bytes(array)),
            Err(_) => {
                tracing::debug!(
                    "Deriving trace id from {} bytes (expected 16)",
                    bytes.len()
                );
                let high = seeded_hash(TRACE_ID_SEED_HIGH, bytes) as u128;
                let low = seeded_hash(TRACE_ID_SEED_LOW, bytes) as u128;
                Self((high << 64) | low)
            }
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s, 32).map(Self)
    }
}

impl From<TraceId> for String {
    fn from(id: TraceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for TraceId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 64-bit span identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SpanId(u64);

impl SpanId {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn to_u64(self) -> u64 {
        self.0
    }

    /// Build from wire bytes. Exactly 8 bytes are read big-endian.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match <[u8; 8]>::try_from(bytes) {
            Ok(array) => Self(u64::from_be_bytes(array)),
            Err(_) => {
                tracing::debug!("Deriving span id from {} bytes (expected 8)", bytes.len());
                Self(seeded_hash(SPAN_ID_SEED, bytes))
            }
        }
    }

    /// Build an optional parent id. Empty bytes mean "no parent".
    pub fn from_parent_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self::from_bytes(bytes))
        }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s, 16).map(|v| Self(v as u64))
    }
}

impl From<SpanId> for String {
    fn from(id: SpanId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SpanId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
