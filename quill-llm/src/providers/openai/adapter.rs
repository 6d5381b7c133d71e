//! Normalized messages ⇄ OpenAI chat messages

use super::types::*;
use crate::{data_uri, result_to_text, tool_name_for, AdapterError, AdapterResult, ProviderAdapter};
use quill_core::{
    ContentPart, Message, ProviderKind, Role, ToolCall as CoreToolCall, ToolResult,
    UnsupportedContentError,
};

const KIND: ProviderKind = ProviderKind::OpenAi;

/// Adapter for the OpenAI chat completions format.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ProviderAdapter for OpenAiAdapter {
    type Payload = ChatPayload;

    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn to_payload(&self, messages: &[Message]) -> Result<ChatPayload, UnsupportedContentError> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            match message.role {
                Role::System => out.push(ChatMessage::System {
                    content: text_only(message)?,
                }),
                Role::User => out.push(ChatMessage::User {
                    content: user_content(message)?,
                }),
                Role::Assistant => out.push(assistant_message(message)?),
                // One wire message per result.
                Role::Tool => {
                    for part in &message.content {
                        match part {
                            ContentPart::ToolResult(result) => out.push(ChatMessage::Tool {
                                tool_call_id: result.id.clone(),
                                content: result_to_text(&result.result),
                            }),
                            other => {
                                return Err(unsupported(
                                    Role::Tool,
                                    other,
                                    "tool messages only carry tool results",
                                ))
                            }
                        }
                    }
                }
            }
        }
        Ok(ChatPayload { messages: out })
    }

    fn from_payload(&self, payload: &ChatPayload) -> Result<Vec<Message>, UnsupportedContentError> {
        let mut out: Vec<Message> = Vec::with_capacity(payload.messages.len());
        for message in &payload.messages {
            let message = match message {
                ChatMessage::System { content } => Message::system(content.clone()),
                ChatMessage::User { content } => Message::new(Role::User, read_user_content(content)?),
                ChatMessage::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut parts: Vec<ContentPart> =
                        content.iter().cloned().map(ContentPart::text).collect();
                    parts.extend(tool_calls.iter().map(|call| {
                        ContentPart::ToolCall(CoreToolCall {
                            id: call.id.clone(),
                            name: call.function.name.clone(),
                            arguments: parse_arguments(&call.function.arguments),
                        })
                    }));
                    Message::new(Role::Assistant, parts)
                }
                ChatMessage::Tool {
                    tool_call_id,
                    content,
                } => Message::tool_result(ToolResult {
                    id: tool_call_id.clone(),
                    name: tool_name_for(&out, tool_call_id),
                    result: serde_json::Value::String(content.clone()),
                    is_error: false,
                }),
            };
            out.push(message);
        }
        Ok(out)
    }

    fn response_message(&self, response: serde_json::Value) -> AdapterResult<Message> {
        let response: CompletionResponse = serde_json::from_value(response)
            .map_err(|e| AdapterError::malformed(KIND, e.to_string()))?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::malformed(KIND, "response has no choices"))?;
        if !matches!(choice.message, ChatMessage::Assistant { .. }) {
            return Err(AdapterError::malformed(KIND, "choice is not an assistant message"));
        }
        let payload = ChatPayload {
            messages: vec![choice.message],
        };
        let mut messages = self.from_payload(&payload)?;
        messages
            .pop()
            .ok_or_else(|| AdapterError::malformed(KIND, "empty choice"))
    }
}

fn unsupported(role: Role, part: &ContentPart, reason: &str) -> UnsupportedContentError {
    UnsupportedContentError::new(KIND, role, part.kind(), reason)
}

fn text_only(message: &Message) -> Result<String, UnsupportedContentError> {
    let mut text = String::new();
    for part in &message.content {
        match part {
            ContentPart::Text { text: t } => text.push_str(t),
            other => {
                return Err(unsupported(
                    message.role,
                    other,
                    "system messages only carry text",
                ))
            }
        }
    }
    Ok(text)
}

fn user_content(message: &Message) -> Result<UserContent, UnsupportedContentError> {
    if let [ContentPart::Text { text }] = message.content.as_slice() {
        return Ok(UserContent::Text(text.clone()));
    }
    let mut parts = Vec::with_capacity(message.content.len());
    for part in &message.content {
        parts.push(match part {
            ContentPart::Text { text } => UserPart::Text { text: text.clone() },
            ContentPart::Image { image, .. } => UserPart::ImageUrl {
                image_url: ImageUrl { url: image.clone() },
            },
            ContentPart::File { file, .. } if data_uri::parse(file).is_some() => UserPart::File {
                file: FileData {
                    file_data: file.clone(),
                    filename: None,
                },
            },
            ContentPart::File { .. } => {
                return Err(unsupported(
                    Role::User,
                    part,
                    "files must be base64 data URIs",
                ))
            }
            other => {
                return Err(unsupported(
                    Role::User,
                    other,
                    "user messages cannot carry tool content",
                ))
            }
        });
    }
    Ok(UserContent::Parts(parts))
}

fn assistant_message(message: &Message) -> Result<ChatMessage, UnsupportedContentError> {
    let mut text: Option<String> = None;
    let mut tool_calls = Vec::new();
    for part in &message.content {
        match part {
            ContentPart::Text { text: t } => text.get_or_insert_with(String::new).push_str(t),
            ContentPart::ToolCall(call) => tool_calls.push(ToolCall {
                id: call.id.clone(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            }),
            other => {
                return Err(unsupported(
                    Role::Assistant,
                    other,
                    "assistant messages carry text and tool calls only",
                ))
            }
        }
    }
    Ok(ChatMessage::Assistant {
        content: text,
        tool_calls,
    })
}

fn read_user_content(content: &UserContent) -> Result<Vec<ContentPart>, UnsupportedContentError> {
    let parts = match content {
        UserContent::Text(text) => return Ok(vec![ContentPart::text(text.clone())]),
        UserContent::Parts(parts) => parts,
    };
    parts
        .iter()
        .map(|part| match part {
            UserPart::Text { text } => Ok(ContentPart::text(text.clone())),
            UserPart::ImageUrl { image_url } => Ok(ContentPart::Image {
                image: image_url.url.clone(),
                mime_type: data_uri::parse(&image_url.url).map(|uri| uri.media_type.to_string()),
            }),
            UserPart::File { file } => match data_uri::parse(&file.file_data) {
                Some(uri) => Ok(ContentPart::File {
                    file: file.file_data.clone(),
                    mime_type: uri.media_type.to_string(),
                }),
                None => Err(UnsupportedContentError::new(
                    KIND,
                    Role::User,
                    "file",
                    "file data is not a base64 data URI",
                )),
            },
        })
        .collect()
}

/// Arguments arrive as JSON text; keep unparseable text as a string.
fn parse_arguments(arguments: &str) -> serde_json::Value {
    serde_json::from_str(arguments)
        .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
}
