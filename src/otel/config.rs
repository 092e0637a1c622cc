//! Transcoder configuration

use serde::{Deserialize, Serialize};

use super::semconv::{semantic_conventions, sort_longest_first, JSON_STRING_ATTRIBUTES};

/// Settings for [`Transcoder`](super::Transcoder)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Path separator for flat attribute keys
    pub separator: String,
    /// Key suffixes whose mapping values travel as JSON strings
    pub json_string_attributes: Vec<String>,
    /// Treat OpenInference convention names as atomic path prefixes
    pub use_semantic_conventions: bool,
    /// Extra atomic prefixes on top of the convention table
    pub extra_conventions: Vec<String>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            json_string_attributes: JSON_STRING_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            use_semantic_conventions: true,
            extra_conventions: Vec::new(),
        }
    }
}

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
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

    pub fn with_semantic_conventions(mut self, enabled: bool) -> Self {
        self.use_semantic_conventions = enabled;
        self
    }

    pub fn with_extra_conventions<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_conventions = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// The effective prefix table, longest first.
    pub fn conventions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.extra_conventions.clone();
        if self.use_semantic_conventions {
            names.extend(semantic_conventions().iter().map(|s| s.to_string()));
        }
        sort_longest_first(names)
    }
}
