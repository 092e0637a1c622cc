//! OpenInference semantic convention attribute names
//!
//! These dotted names are reserved: the attribute codec treats each one as a
//! single path segment and never splits it at its inner dots.

use std::sync::OnceLock;

// Span kind
pub const OPENINFERENCE_SPAN_KIND: &str = "openinference.span.kind";

// Input / output
pub const INPUT_VALUE: &str = "input.value";
pub const INPUT_MIME_TYPE: &str = "input.mime_type";
pub const OUTPUT_VALUE: &str = "output.value";
pub const OUTPUT_MIME_TYPE: &str = "output.mime_type";

// LLM
pub const LLM_FUNCTION_CALL: &str = "llm.function_call";
pub const LLM_INVOCATION_PARAMETERS: &str = "llm.invocation_parameters";
pub const LLM_INPUT_MESSAGES: &str = "llm.input_messages";
pub const LLM_OUTPUT_MESSAGES: &str = "llm.output_messages";
pub const LLM_MODEL_NAME: &str = "llm.model_name";
pub const LLM_PROVIDER: &str = "llm.provider";
pub const LLM_SYSTEM: &str = "llm.system";
pub const LLM_PROMPTS: &str = "llm.prompts";
pub const LLM_PROMPT_TEMPLATE: &str = "llm.prompt_template.template";
pub const LLM_PROMPT_TEMPLATE_VARIABLES: &str = "llm.prompt_template.variables";
pub const LLM_PROMPT_TEMPLATE_VERSION: &str = "llm.prompt_template.version";
pub const LLM_TOKEN_COUNT_PROMPT: &str = "llm.token_count.prompt";
pub const LLM_TOKEN_COUNT_COMPLETION: &str = "llm.token_count.completion";
pub const LLM_TOKEN_COUNT_TOTAL: &str = "llm.token_count.total";
pub const LLM_TOOLS: &str = "llm.tools";

// Messages
pub const MESSAGE_ROLE: &str = "message.role";
pub const MESSAGE_CONTENT: &str = "message.content";
pub const MESSAGE_CONTENTS: &str = "message.contents";
pub const MESSAGE_NAME: &str = "message.name";
pub const MESSAGE_TOOL_CALLS: &str = "message.tool_calls";
pub const MESSAGE_TOOL_CALL_ID: &str = "message.tool_call_id";
pub const MESSAGE_FUNCTION_CALL_NAME: &str = "message.function_call_name";
pub const MESSAGE_FUNCTION_CALL_ARGUMENTS_JSON: &str = "message.function_call_arguments_json";
pub const MESSAGE_CONTENT_TYPE: &str = "message_content.type";
pub const MESSAGE_CONTENT_TEXT: &str = "message_content.text";
pub const MESSAGE_CONTENT_IMAGE: &str = "message_content.image";
pub const IMAGE_URL: &str = "image.url";

// Tools
pub const TOOL_NAME: &str = "tool.name";
pub const TOOL_DESCRIPTION: &str = "tool.description";
pub const TOOL_PARAMETERS: &str = "tool.parameters";
pub const TOOL_JSON_SCHEMA: &str = "tool.json_schema";
pub const TOOL_CALL_ID: &str = "tool_call.id";
pub const TOOL_CALL_FUNCTION_NAME: &str = "tool_call.function.name";
pub const TOOL_CALL_FUNCTION_ARGUMENTS_JSON: &str = "tool_call.function.arguments";

// Retrieval / reranking
pub const RETRIEVAL_DOCUMENTS: &str = "retrieval.documents";
pub const DOCUMENT_ID: &str = "document.id";
pub const DOCUMENT_SCORE: &str = "document.score";
pub const DOCUMENT_CONTENT: &str = "document.content";
pub const DOCUMENT_METADATA: &str = "document.metadata";
pub const RERANKER_INPUT_DOCUMENTS: &str = "reranker.input_documents";
pub const RERANKER_OUTPUT_DOCUMENTS: &str = "reranker.output_documents";
pub const RERANKER_QUERY: &str = "reranker.query";
pub const RERANKER_MODEL_NAME: &str = "reranker.model_name";
pub const RERANKER_TOP_K: &str = "reranker.top_k";

// Embeddings
pub const EMBEDDING_EMBEDDINGS: &str = "embedding.embeddings";
pub const EMBEDDING_MODEL_NAME: &str = "embedding.model_name";
pub const EMBEDDING_TEXT: &str = "embedding.text";
pub const EMBEDDING_VECTOR: &str = "embedding.vector";

// Context
pub const METADATA: &str = "metadata";
pub const TAG_TAGS: &str = "tag.tags";
pub const SESSION_ID: &str = "session.id";
pub const USER_ID: &str = "user.id";

// Exception reporting
pub const EXCEPTION_EVENT_NAME: &str = "exception";
pub const EXCEPTION_TYPE: &str = "exception.type";
pub const EXCEPTION_MESSAGE: &str = "exception.message";
pub const EXCEPTION_ESCAPED: &str = "exception.escaped";
pub const EXCEPTION_STACKTRACE: &str = "exception.stacktrace";

const SEMANTIC_CONVENTIONS: &[&str] = &[
    OPENINFERENCE_SPAN_KIND,
    INPUT_VALUE,
    INPUT_MIME_TYPE,
    OUTPUT_VALUE,
    OUTPUT_MIME_TYPE,
    LLM_FUNCTION_CALL,
    LLM_INVOCATION_PARAMETERS,
    LLM_INPUT_MESSAGES,
    LLM_OUTPUT_MESSAGES,
    LLM_MODEL_NAME,
    LLM_PROVIDER,
    LLM_SYSTEM,
    LLM_PROMPTS,
    LLM_PROMPT_TEMPLATE,
    LLM_PROMPT_TEMPLATE_VARIABLES,
    LLM_PROMPT_TEMPLATE_VERSION,
    LLM_TOKEN_COUNT_PROMPT,
    LLM_TOKEN_COUNT_COMPLETION,
    LLM_TOKEN_COUNT_TOTAL,
    LLM_TOOLS,
    MESSAGE_ROLE,
    MESSAGE_CONTENT,
    MESSAGE_CONTENTS,
    MESSAGE_NAME,
    MESSAGE_TOOL_CALLS,
    MESSAGE_TOOL_CALL_ID,
    MESSAGE_FUNCTION_CALL_NAME,
    MESSAGE_FUNCTION_CALL_ARGUMENTS_JSON,
    MESSAGE_CONTENT_TYPE,
    MESSAGE_CONTENT_TEXT,
    MESSAGE_CONTENT_IMAGE,
    IMAGE_URL,
    TOOL_NAME,
    TOOL_DESCRIPTION,
    TOOL_PARAMETERS,
    TOOL_JSON_SCHEMA,
    TOOL_CALL_ID,
    TOOL_CALL_FUNCTION_NAME,
    TOOL_CALL_FUNCTION_ARGUMENTS_JSON,
    RETRIEVAL_DOCUMENTS,
    DOCUMENT_ID,
    DOCUMENT_SCORE,
    DOCUMENT_CONTENT,
    DOCUMENT_METADATA,
    RERANKER_INPUT_DOCUMENTS,
    RERANKER_OUTPUT_DOCUMENTS,
    RERANKER_QUERY,
    RERANKER_MODEL_NAME,
    RERANKER_TOP_K,
    EMBEDDING_EMBEDDINGS,
    EMBEDDING_MODEL_NAME,
    EMBEDDING_TEXT,
    EMBEDDING_VECTOR,
    METADATA,
    TAG_TAGS,
    SESSION_ID,
    USER_ID,
];

/// Attributes whose mapping values travel as a single JSON string.
pub const JSON_STRING_ATTRIBUTES: &[&str] = &[
    DOCUMENT_METADATA,
    LLM_PROMPT_TEMPLATE_VARIABLES,
    METADATA,
    TOOL_PARAMETERS,
];

/// The convention table, longest name first.
///
/// Ties are broken lexicographically so the order is stable.
pub fn semantic_conventions() -> &'static [&'static str] {
    static TABLE: OnceLock<Vec<&'static str>> = OnceLock::new();
    TABLE.get_or_init(|| sort_longest_first(SEMANTIC_CONVENTIONS.to_vec()))
}

pub(crate) fn sort_longest_first<S: AsRef<str>>(mut names: Vec<S>) -> Vec<S> {
    names.sort_by(|a, b| {
        let (a, b) = (as_str(a), as_str(b));
        b.len().cmp(&a.len()).then_with(|| a.cmp(b))
    });
    names.dedup_by(|a, b| as_str(&*a) == as_str(&*b));
    names
}

fn as_str<S: AsRef<str>>(s: &S) -> &str {
    s.as_ref()
}

/// Find the most specific convention that is a proper prefix of `key`.
///
/// The match must end on a separator boundary and leave a non-empty
/// remainder, which is returned alongside the convention.
pub fn match_convention<'k, S: AsRef<str>>(
    key: &'k str,
    conventions: &[S],
    separator: &str,
) -> Option<(usize, &'k str)> {
    conventions.iter().enumerate().find_map(|(i, convention)| {
        let rest = key.strip_prefix(as_str(convention))?;
        let rest = rest.strip_prefix(separator)?;
        (!rest.is_empty()).then_some((i, rest))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_longest_first() {
        let table = semantic_conventions();
        assert!(table.windows(2).all(|w| w[0].len() >= w[1].len()));
        assert!(table.contains(&RETRIEVAL_DOCUMENTS));
        assert!(table.contains(&LLM_TOKEN_COUNT_COMPLETION));
    }

    #[test]
    fn test_table_is_built_once() {
        let a = semantic_conventions().as_ptr();
        let b = semantic_conventions().as_ptr();
        assert_eq!(a, b);
    }

    #[test]
    fn test_match_convention() {
        let table = semantic_conventions();
        let (i, rest) =
            match_convention("retrieval.documents.0.document.score", table, ".").unwrap();
        assert_eq!(table[i], RETRIEVAL_DOCUMENTS);
        assert_eq!(rest, "0.document.score");

        // Exact names are not proper prefixes
        assert!(match_convention(LLM_MODEL_NAME, table, ".").is_none());
        // Prefixes must end on a separator
        assert!(match_convention("metadatax.a", table, ".").is_none());
    }

    #[test]
    fn test_sort_prefers_specific_prefix() {
        let sorted = sort_longest_first(vec!["llm", "llm.token_count", "llm.token_count"]);
        assert_eq!(sorted, vec!["llm.token_count", "llm"]);
    }
}
