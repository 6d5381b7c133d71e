//! Normalized messages ⇄ Anthropic content blocks

use super::types::*;
use crate::{
    data_uri, result_to_text, split_user_turn, tool_name_for, AdapterError, AdapterResult,
    ProviderAdapter,
};
use quill_core::{ContentPart, Message, ProviderKind, Role, ToolCall, ToolResult, UnsupportedContentError};

const KIND: ProviderKind = ProviderKind::Anthropic;

/// Documents given by URL carry no media type on the wire.
const DEFAULT_DOCUMENT_TYPE: &str = "application/pdf";

/// Adapter for the Anthropic messages API.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    type Payload = MessagesPayload;

    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn to_payload(&self, messages: &[Message]) -> Result<MessagesPayload, UnsupportedContentError> {
        let mut system = Vec::new();
        let mut out: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                Role::System => {
                    if !out.is_empty() {
                        let part = message.content.first().map_or("text", ContentPart::kind);
                        return Err(UnsupportedContentError::new(
                            KIND,
                            Role::System,
                            part,
                            "system messages must come before the conversation",
                        ));
                    }
                    for part in &message.content {
                        match part {
                            ContentPart::Text { text } => {
                                system.push(SystemBlock::Text { text: text.clone() })
                            }
                            other => {
                                return Err(unsupported(
                                    Role::System,
                                    other,
                                    "system prompts only carry text",
                                ))
                            }
                        }
                    }
                }
                Role::User => out.push(AnthropicMessage {
                    role: AnthropicRole::User,
                    content: blocks(message, user_block)?,
                }),
                Role::Assistant => out.push(AnthropicMessage {
                    role: AnthropicRole::Assistant,
                    content: blocks(message, assistant_block)?,
                }),
                Role::Tool => out.push(AnthropicMessage {
                    role: AnthropicRole::User,
                    content: blocks(message, tool_block)?,
                }),
            }
        }

        Ok(MessagesPayload {
            system,
            messages: out,
        })
    }

    fn from_payload(&self, payload: &MessagesPayload) -> Result<Vec<Message>, UnsupportedContentError> {
        let mut out: Vec<Message> = payload
            .system
            .iter()
            .map(|SystemBlock::Text { text }| Message::system(text.clone()))
            .collect();

        for message in &payload.messages {
            match message.role {
                AnthropicRole::Assistant => {
                    let parts = message
                        .content
                        .iter()
                        .map(read_assistant_block)
                        .collect::<Result<Vec<_>, _>>()?;
                    out.push(Message::new(Role::Assistant, parts));
                }
                AnthropicRole::User => {
                    let parts = message
                        .content
                        .iter()
                        .map(|block| read_user_block(block, &out))
                        .collect::<Result<Vec<_>, _>>()?;
                    out.extend(split_user_turn(parts));
                }
            }
        }
        Ok(out)
    }

    fn response_message(&self, response: serde_json::Value) -> AdapterResult<Message> {
        let response: MessagesResponse = serde_json::from_value(response)
            .map_err(|e| AdapterError::malformed(KIND, e.to_string()))?;
        if response.role != AnthropicRole::Assistant {
            return Err(AdapterError::malformed(KIND, "response is not from the assistant"));
        }
        let parts = response
            .content
            .iter()
            .map(read_assistant_block)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Message::new(Role::Assistant, parts))
    }
}

// ============================================================================
// TO WIRE
// ============================================================================

fn unsupported(role: Role, part: &ContentPart, reason: &str) -> UnsupportedContentError {
    UnsupportedContentError::new(KIND, role, part.kind(), reason)
}

fn blocks(
    message: &Message,
    convert: fn(&ContentPart) -> Result<ContentBlock, &'static str>,
) -> Result<Vec<ContentBlock>, UnsupportedContentError> {
    message
        .content
        .iter()
        .map(|part| convert(part).map_err(|reason| unsupported(message.role, part, reason)))
        .collect()
}

fn user_block(part: &ContentPart) -> Result<ContentBlock, &'static str> {
    match part {
        ContentPart::Text { text } => Ok(ContentBlock::Text { text: text.clone() }),
        ContentPart::Image { image, mime_type } => Ok(ContentBlock::Image {
            source: source(image, mime_type.as_deref()),
        }),
        ContentPart::File { file, mime_type } => Ok(ContentBlock::Document {
            source: source(file, Some(mime_type)),
        }),
        _ => Err("user messages cannot carry tool content"),
    }
}

fn assistant_block(part: &ContentPart) -> Result<ContentBlock, &'static str> {
    match part {
        ContentPart::Text { text } => Ok(ContentBlock::Text { text: text.clone() }),
        ContentPart::ToolCall(call) => Ok(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        }),
        _ => Err("assistant messages carry text and tool calls only"),
    }
}

fn tool_block(part: &ContentPart) -> Result<ContentBlock, &'static str> {
    match part {
        ContentPart::ToolResult(result) => Ok(ContentBlock::ToolResult {
            tool_use_id: result.id.clone(),
            content: result_to_text(&result.result),
            is_error: result.is_error,
        }),
        _ => Err("tool messages only carry tool results"),
    }
}

/// Data URIs travel inline; anything else is referenced by URL.
fn source(uri: &str, declared: Option<&str>) -> Source {
    match data_uri::parse(uri) {
        Some(parsed) => Source::Base64 {
            media_type: declared.unwrap_or(parsed.media_type).to_string(),
            data: parsed.data.to_string(),
        },
        None => Source::Url {
            url: uri.to_string(),
        },
    }
}

// ============================================================================
// FROM WIRE
// ============================================================================

fn read_user_block(block: &ContentBlock, earlier: &[Message]) -> Result<ContentPart, UnsupportedContentError> {
    Ok(match block {
        ContentBlock::Text { text } => ContentPart::text(text.clone()),
        ContentBlock::Image { source } => {
            let (image, media_type) = read_source(source);
            ContentPart::Image {
                image,
                mime_type: media_type,
            }
        }
        ContentBlock::Document { source } => {
            let (file, media_type) = read_source(source);
            ContentPart::File {
                file,
                mime_type: media_type.unwrap_or_else(|| DEFAULT_DOCUMENT_TYPE.to_string()),
            }
        }
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentPart::ToolResult(ToolResult {
            id: tool_use_id.clone(),
            name: tool_name_for(earlier, tool_use_id),
            result: serde_json::Value::String(content.clone()),
            is_error: *is_error,
        }),
        ContentBlock::ToolUse { .. } => {
            return Err(UnsupportedContentError::new(
                KIND,
                Role::User,
                block.kind(),
                "tool calls only come from the assistant",
            ))
        }
    })
}

fn read_assistant_block(block: &ContentBlock) -> Result<ContentPart, UnsupportedContentError> {
    match block {
        ContentBlock::Text { text } => Ok(ContentPart::text(text.clone())),
        ContentBlock::ToolUse { id, name, input } => Ok(ContentPart::ToolCall(ToolCall {
            id: id.clone(),
            name: name.clone(),
            arguments: input.clone(),
        })),
        other => Err(UnsupportedContentError::new(
            KIND,
            Role::Assistant,
            other.kind(),
            "assistant messages carry text and tool calls only",
        )),
    }
}

fn read_source(source: &Source) -> (String, Option<String>) {
    match source {
        Source::Base64 { media_type, data } => {
            (data_uri::format(media_type, data), Some(media_type.clone()))
        }
        Source::Url { url } => (url.clone(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_call() -> ToolCall {
        ToolCall {
            id: "toolu_1".to_string(),
            name: "get_weather".to_string(),
            arguments: json!({"city": "Paris"}),
        }
    }

    #[test]
    fn test_system_is_hoisted() {
        let messages = vec![Message::system("Be brief."), Message::user("Hi")];
        let payload = AnthropicAdapter.to_payload(&messages).expect("converts");
        assert_eq!(
            serde_json::to_value(&payload).expect("serializes"),
            json!({
                "system": [{"type": "text", "text": "Be brief."}],
                "messages": [{"role": "user", "content": [{"type": "text", "text": "Hi"}]}]
            })
        );
    }

    #[test]
    fn test_late_system_message_is_unsupported() {
        let messages = vec![Message::user("Hi"), Message::system("Be brief.")];
        let err = AnthropicAdapter.to_payload(&messages).expect_err("late system");
        assert_eq!(err.role, Role::System);
        assert_eq!(err.part, "text");
    }

    #[test]
    fn test_tool_round_trip() {
        let messages = vec![
            Message::user("Weather in Paris?"),
            Message::assistant_tool_calls(vec![weather_call()]),
            Message::tool_result(ToolResult {
                id: "toolu_1".to_string(),
                name: "get_weather".to_string(),
                result: json!("20C"),
                is_error: true,
            }),
        ];
        let payload = AnthropicAdapter.to_payload(&messages).expect("converts");
        let json = serde_json::to_value(&payload).expect("serializes");
        assert_eq!(json["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(json["messages"][2]["role"], "user");
        assert_eq!(json["messages"][2]["content"][0]["is_error"], true);

        assert_eq!(AnthropicAdapter.from_payload(&payload).expect("reads back"), messages);
    }

    #[test]
    fn test_inline_image_and_remote_document() {
        let message = Message::new(
            Role::User,
            vec![
                ContentPart::Image {
                    image: "data:image/png;base64,iVBORw0KGgo=".to_string(),
                    mime_type: Some("image/png".to_string()),
                },
                ContentPart::File {
                    file: "https://example.com/report.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                },
            ],
        );
        let payload = AnthropicAdapter.to_payload(&[message.clone()]).expect("converts");
        let json = serde_json::to_value(&payload).expect("serializes");
        assert_eq!(
            json["messages"][0]["content"][0]["source"],
            json!({"type": "base64", "media_type": "image/png", "data": "iVBORw0KGgo="})
        );
        assert_eq!(json["messages"][0]["content"][1]["source"]["type"], "url");
        assert_eq!(AnthropicAdapter.from_payload(&payload).expect("reads"), vec![message]);
    }

    #[test]
    fn test_response_message() {
        let response = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
            ]
        });
        let message = AnthropicAdapter.response_message(response).expect("assistant message");
        assert_eq!(message.text(), "Checking.");
        assert_eq!(message.tool_calls().cloned().collect::<Vec<_>>(), vec![weather_call()]);
    }
}
