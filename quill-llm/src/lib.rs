//! Quill LLM - Provider Message Adapters
//!
//! Pure conversions between the normalized [`Message`] representation and the
//! wire shapes of each supported provider. Nothing here performs I/O: the
//! host sends the payload and hands the reply back.
//!
//! Every normalized message either maps to a valid provider shape or fails
//! with [`UnsupportedContentError`] naming the offending part.

pub mod data_uri;
pub mod providers;

use quill_core::{ContentPart, Message, ProviderKind, Role, UnsupportedContentError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use providers::{AnthropicAdapter, GoogleAdapter, OpenAiAdapter};

// ============================================================================
// ADAPTER TRAIT
// ============================================================================

/// Conversion between normalized messages and one provider's request shape.
///
/// Implementations must be stateless and thread-safe (Send + Sync).
pub trait ProviderAdapter: Send + Sync {
    /// The provider's request body (the message-carrying part of it).
    type Payload: Serialize + DeserializeOwned;

    fn kind(&self) -> ProviderKind;

    /// Map a conversation to the provider's request shape.
    fn to_payload(&self, messages: &[Message]) -> Result<Self::Payload, UnsupportedContentError>;

    /// Map a provider request back to normalized messages.
    fn from_payload(&self, payload: &Self::Payload) -> Result<Vec<Message>, UnsupportedContentError>;

    /// Extract the assistant message from a provider completion response.
    fn response_message(&self, response: serde_json::Value) -> Result<Message, AdapterError>;
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedContentError),

    #[error("malformed {provider} payload: {reason}")]
    Malformed {
        provider: ProviderKind,
        reason: String,
    },
}

impl AdapterError {
    pub(crate) fn malformed(provider: ProviderKind, reason: impl Into<String>) -> Self {
        AdapterError::Malformed {
            provider,
            reason: reason.into(),
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

// ============================================================================
// DISPATCH
// ============================================================================

/// A provider request body, tagged with its provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", content = "payload")]
pub enum ProviderPayload {
    #[serde(rename = "openai")]
    OpenAi(providers::openai::ChatPayload),
    #[serde(rename = "anthropic")]
    Anthropic(providers::anthropic::MessagesPayload),
    #[serde(rename = "google")]
    Google(providers::google::GenerateContentPayload),
}

impl ProviderPayload {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderPayload::OpenAi(_) => ProviderKind::OpenAi,
            ProviderPayload::Anthropic(_) => ProviderKind::Anthropic,
            ProviderPayload::Google(_) => ProviderKind::Google,
        }
    }

    /// The bare provider JSON, ready to merge into a request body.
    pub fn to_json(&self) -> serde_json::Value {
        let value = match self {
            ProviderPayload::OpenAi(payload) => serde_json::to_value(payload),
            ProviderPayload::Anthropic(payload) => serde_json::to_value(payload),
            ProviderPayload::Google(payload) => serde_json::to_value(payload),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Read bare provider JSON.
    pub fn from_json(kind: ProviderKind, value: serde_json::Value) -> AdapterResult<Self> {
        let malformed = |e: serde_json::Error| AdapterError::malformed(kind, e.to_string());
        Ok(match kind {
            ProviderKind::OpenAi => {
                ProviderPayload::OpenAi(serde_json::from_value(value).map_err(malformed)?)
            }
            ProviderKind::Anthropic => {
                ProviderPayload::Anthropic(serde_json::from_value(value).map_err(malformed)?)
            }
            ProviderKind::Google => {
                ProviderPayload::Google(serde_json::from_value(value).map_err(malformed)?)
            }
        })
    }
}

/// Convert a conversation into `provider`'s request shape.
pub fn to_provider_format(
    messages: &[Message],
    provider: ProviderKind,
) -> Result<ProviderPayload, UnsupportedContentError> {
    debug!(provider = %provider, messages = messages.len(), "to provider format");
    Ok(match provider {
        ProviderKind::OpenAi => ProviderPayload::OpenAi(OpenAiAdapter.to_payload(messages)?),
        ProviderKind::Anthropic => {
            ProviderPayload::Anthropic(AnthropicAdapter.to_payload(messages)?)
        }
        ProviderKind::Google => ProviderPayload::Google(GoogleAdapter.to_payload(messages)?),
    })
}

/// Convert a provider request shape back into a conversation.
pub fn from_provider_format(
    payload: &ProviderPayload,
) -> Result<Vec<Message>, UnsupportedContentError> {
    debug!(provider = %payload.kind(), "from provider format");
    match payload {
        ProviderPayload::OpenAi(payload) => OpenAiAdapter.from_payload(payload),
        ProviderPayload::Anthropic(payload) => AnthropicAdapter.from_payload(payload),
        ProviderPayload::Google(payload) => GoogleAdapter.from_payload(payload),
    }
}

/// Extract the assistant message from a raw completion response.
pub fn response_message(provider: ProviderKind, response: serde_json::Value) -> AdapterResult<Message> {
    match provider {
        ProviderKind::OpenAi => OpenAiAdapter.response_message(response),
        ProviderKind::Anthropic => AnthropicAdapter.response_message(response),
        ProviderKind::Google => GoogleAdapter.response_message(response),
    }
}

/// Tool results travel as strings for providers without structured results.
pub(crate) fn result_to_text(result: &serde_json::Value) -> String {
    match result {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Lookup of tool names by call id, for formats that drop the name on results.
pub(crate) fn tool_name_for(messages: &[Message], id: &str) -> String {
    messages
        .iter()
        .rev()
        .flat_map(|message| message.tool_calls())
        .find(|call| call.id == id)
        .map(|call| call.name.clone())
        .unwrap_or_default()
}

/// Split one provider "user" turn into user and tool messages.
///
/// Consecutive tool results become a single tool message; everything else
/// stays with the user.
pub(crate) fn split_user_turn(parts: Vec<ContentPart>) -> Vec<Message> {
    if parts.is_empty() {
        return vec![Message::new(Role::User, parts)];
    }
    let mut messages: Vec<Message> = Vec::new();
    for part in parts {
        let role = match part {
            ContentPart::ToolResult(_) => Role::Tool,
            _ => Role::User,
        };
        match messages.last_mut() {
            Some(last) if last.role == role => last.content.push(part),
            _ => messages.push(Message::new(role, vec![part])),
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_picks_provider() {
        let messages = vec![Message::system("Be brief."), Message::user("Hi")];
        for kind in ProviderKind::ALL {
            let payload = to_provider_format(&messages, kind).expect("text converts");
            assert_eq!(payload.kind(), kind);
            assert_eq!(from_provider_format(&payload).expect("reads back"), messages);
        }
    }

    #[test]
    fn test_payload_json_round_trip() {
        let payload =
            to_provider_format(&[Message::user("Hi")], ProviderKind::Google).expect("converts");
        let json = payload.to_json();
        assert!(json.get("contents").is_some());
        let back = ProviderPayload::from_json(ProviderKind::Google, json).expect("parses");
        assert_eq!(back, payload);
    }

    #[test]
    fn test_from_json_rejects_wrong_shape() {
        let err = ProviderPayload::from_json(ProviderKind::OpenAi, serde_json::json!({"x": 1}))
            .expect_err("no messages");
        assert!(matches!(err, AdapterError::Malformed { provider: ProviderKind::OpenAi, .. }));
    }

    #[test]
    fn test_unsupported_error_names_part() {
        let message = Message::new(
            Role::System,
            vec![ContentPart::Image {
                image: "https://example.com/a.png".to_string(),
                mime_type: None,
            }],
        );
        for kind in ProviderKind::ALL {
            let err = to_provider_format(&[message.clone()], kind).expect_err("image in system");
            assert_eq!(err.provider, kind);
            assert_eq!(err.part, "image");
            assert_eq!(err.role, Role::System);
        }
    }

    #[test]
    fn test_tool_name_lookup() {
        let messages = vec![Message::assistant_tool_calls(vec![quill_core::ToolCall {
            id: "c1".to_string(),
            name: "lookup".to_string(),
            arguments: serde_json::json!({}),
        }])];
        assert_eq!(tool_name_for(&messages, "c1"), "lookup");
        assert_eq!(tool_name_for(&messages, "c2"), "");
    }

    #[test]
    fn test_split_user_turn_groups_runs() {
        let result = |id: &str| {
            ContentPart::ToolResult(quill_core::ToolResult {
                id: id.to_string(),
                name: "lookup".to_string(),
                result: serde_json::json!("ok"),
                is_error: false,
            })
        };
        let messages = split_user_turn(vec![
            result("a"),
            result("b"),
            ContentPart::text("thanks"),
        ]);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Tool, Role::User]);
        assert_eq!(messages[0].tool_results().count(), 2);

        assert_eq!(split_user_turn(Vec::new()), vec![Message::new(Role::User, Vec::new())]);
    }
}
