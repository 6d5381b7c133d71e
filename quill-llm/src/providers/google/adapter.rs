//! Normalized messages ⇄ Gemini contents

use super::types::*;
use crate::{data_uri, split_user_turn, AdapterError, AdapterResult, ProviderAdapter};
use quill_core::{ContentPart, Message, ProviderKind, Role, ToolCall, ToolResult, UnsupportedContentError};
use serde_json::json;

const KIND: ProviderKind = ProviderKind::Google;

/// Adapter for the Gemini generateContent API.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

impl ProviderAdapter for GoogleAdapter {
    type Payload = GenerateContentPayload;

    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn to_payload(
        &self,
        messages: &[Message],
    ) -> Result<GenerateContentPayload, UnsupportedContentError> {
        let mut instruction: Vec<Part> = Vec::new();
        let mut contents: Vec<Content> = Vec::with_capacity(messages.len());

        for message in messages {
            let (role, convert): (GoogleRole, fn(&ContentPart) -> Result<Part, &'static str>) =
                match message.role {
                    Role::System => {
                        if !contents.is_empty() {
                            let part = message.content.first().map_or("text", ContentPart::kind);
                            return Err(UnsupportedContentError::new(
                                KIND,
                                Role::System,
                                part,
                                "system instructions must come before the conversation",
                            ));
                        }
                        instruction.extend(parts(message, system_part)?);
                        continue;
                    }
                    Role::User => (GoogleRole::User, user_part),
                    Role::Assistant => (GoogleRole::Model, model_part),
                    Role::Tool => (GoogleRole::User, tool_part),
                };
            contents.push(Content {
                role,
                parts: parts(message, convert)?,
            });
        }

        Ok(GenerateContentPayload {
            system_instruction: (!instruction.is_empty())
                .then(|| SystemInstruction { parts: instruction }),
            contents,
        })
    }

    fn from_payload(
        &self,
        payload: &GenerateContentPayload,
    ) -> Result<Vec<Message>, UnsupportedContentError> {
        let mut out = Vec::new();
        if let Some(instruction) = &payload.system_instruction {
            for part in &instruction.parts {
                match part {
                    Part::Text(text) => out.push(Message::system(text.clone())),
                    other => {
                        return Err(UnsupportedContentError::new(
                            KIND,
                            Role::System,
                            other.kind(),
                            "system instructions only carry text",
                        ))
                    }
                }
            }
        }

        let mut reader = Reader::default();
        for content in &payload.contents {
            match content.role {
                GoogleRole::Model => {
                    let message = reader.model_message(&content.parts)?;
                    out.push(message);
                }
                GoogleRole::User => {
                    let parts = content
                        .parts
                        .iter()
                        .map(|part| reader.user_part(part, &out))
                        .collect::<Result<Vec<_>, _>>()?;
                    out.extend(split_user_turn(parts));
                }
            }
        }
        Ok(out)
    }

    fn response_message(&self, response: serde_json::Value) -> AdapterResult<Message> {
        let response: GenerateContentResponse = serde_json::from_value(response)
            .map_err(|e| AdapterError::malformed(KIND, e.to_string()))?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::malformed(KIND, "response has no candidates"))?;
        if candidate.content.role != GoogleRole::Model {
            return Err(AdapterError::malformed(KIND, "candidate is not from the model"));
        }
        Ok(Reader::default().model_message(&candidate.content.parts)?)
    }
}

// ============================================================================
// TO WIRE
// ============================================================================

fn parts(
    message: &Message,
    convert: fn(&ContentPart) -> Result<Part, &'static str>,
) -> Result<Vec<Part>, UnsupportedContentError> {
    message
        .content
        .iter()
        .map(|part| {
            convert(part)
                .map_err(|reason| UnsupportedContentError::new(KIND, message.role, part.kind(), reason))
        })
        .collect()
}

fn system_part(part: &ContentPart) -> Result<Part, &'static str> {
    match part {
        ContentPart::Text { text } => Ok(Part::Text(text.clone())),
        _ => Err("system instructions only carry text"),
    }
}

fn user_part(part: &ContentPart) -> Result<Part, &'static str> {
    match part {
        ContentPart::Text { text } => Ok(Part::Text(text.clone())),
        ContentPart::Image { image, mime_type } => match (data_uri::parse(image), mime_type) {
            (Some(uri), declared) => Ok(inline(uri, declared.as_deref())),
            (None, Some(mime_type)) => Ok(Part::FileData(FileData {
                mime_type: mime_type.clone(),
                file_uri: image.clone(),
            })),
            (None, None) => Err("images by URL need a mime type"),
        },
        ContentPart::File { file, mime_type } => Ok(match data_uri::parse(file) {
            Some(uri) => inline(uri, Some(mime_type)),
            None => Part::FileData(FileData {
                mime_type: mime_type.clone(),
                file_uri: file.clone(),
            }),
        }),
        _ => Err("user messages cannot carry tool content"),
    }
}

fn model_part(part: &ContentPart) -> Result<Part, &'static str> {
    match part {
        ContentPart::Text { text } => Ok(Part::Text(text.clone())),
        ContentPart::ToolCall(call) => Ok(Part::FunctionCall(FunctionCall {
            id: Some(call.id.clone()),
            name: call.name.clone(),
            args: call.arguments.clone(),
        })),
        _ => Err("model turns carry text and function calls only"),
    }
}

fn tool_part(part: &ContentPart) -> Result<Part, &'static str> {
    match part {
        ContentPart::ToolResult(result) => {
            let key = if result.is_error { "error" } else { "content" };
            Ok(Part::FunctionResponse(FunctionResponse {
                id: Some(result.id.clone()),
                name: result.name.clone(),
                response: json!({ "name": result.name, key: result.result }),
            }))
        }
        _ => Err("tool messages only carry tool results"),
    }
}

fn inline(uri: data_uri::DataUri<'_>, declared: Option<&str>) -> Part {
    Part::InlineData(Blob {
        mime_type: declared.unwrap_or(uri.media_type).to_string(),
        data: uri.data.to_string(),
    })
}

// ============================================================================
// FROM WIRE
// ============================================================================

/// Reads contents in order, inventing ids for calls that arrive without one.
#[derive(Default)]
struct Reader {
    synthesized: usize,
}

impl Reader {
    fn model_message(&mut self, parts: &[Part]) -> Result<Message, UnsupportedContentError> {
        let content = parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => Ok(ContentPart::text(text.clone())),
                Part::FunctionCall(call) => Ok(ContentPart::ToolCall(ToolCall {
                    id: call.id.clone().unwrap_or_else(|| self.next_id(&call.name)),
                    name: call.name.clone(),
                    arguments: call.args.clone(),
                })),
                other => Err(UnsupportedContentError::new(
                    KIND,
                    Role::Assistant,
                    other.kind(),
                    "model turns carry text and function calls only",
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Message::new(Role::Assistant, content))
    }

    fn user_part(&mut self, part: &Part, earlier: &[Message]) -> Result<ContentPart, UnsupportedContentError> {
        Ok(match part {
            Part::Text(text) => ContentPart::text(text.clone()),
            Part::InlineData(blob) => media(
                data_uri::format(&blob.mime_type, &blob.data),
                &blob.mime_type,
            ),
            Part::FileData(file) => media(file.file_uri.clone(), &file.mime_type),
            Part::FunctionResponse(response) => {
                let id = match &response.id {
                    Some(id) => id.clone(),
                    None => call_id_for(earlier, &response.name)
                        .unwrap_or_else(|| self.next_id(&response.name)),
                };
                let (result, is_error) = unwrap_response(&response.response);
                ContentPart::ToolResult(ToolResult {
                    id,
                    name: response.name.clone(),
                    result,
                    is_error,
                })
            }
            Part::FunctionCall(_) => {
                return Err(UnsupportedContentError::new(
                    KIND,
                    Role::User,
                    part.kind(),
                    "function calls only come from the model",
                ))
            }
        })
    }

    fn next_id(&mut self, name: &str) -> String {
        self.synthesized += 1;
        format!("{}_{}", name, self.synthesized)
    }
}

fn media(uri: String, mime_type: &str) -> ContentPart {
    if mime_type.starts_with("image/") {
        ContentPart::Image {
            image: uri,
            mime_type: Some(mime_type.to_string()),
        }
    } else {
        ContentPart::File {
            file: uri,
            mime_type: mime_type.to_string(),
        }
    }
}

/// Most recent call to `name`, for responses that carry no id.
fn call_id_for(earlier: &[Message], name: &str) -> Option<String> {
    earlier
        .iter()
        .rev()
        .find_map(|message| message.tool_calls().filter(|call| call.name == name).last())
        .map(|call| call.id.clone())
}

fn unwrap_response(response: &serde_json::Value) -> (serde_json::Value, bool) {
    if let Some(content) = response.get("content") {
        (content.clone(), false)
    } else if let Some(error) = response.get("error") {
        (error.clone(), true)
    } else {
        (response.clone(), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let messages = vec![
            Message::system("Be brief."),
            Message::user("Weather?"),
            Message::assistant_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                arguments: json!({"city": "Paris"}),
            }]),
            Message::tool_result(ToolResult {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                result: json!({"temperature": 20}),
                is_error: false,
            }),
        ];
        let payload = GoogleAdapter.to_payload(&messages).expect("converts");
        assert_eq!(
            serde_json::to_value(&payload).expect("serializes"),
            json!({
                "systemInstruction": {"parts": [{"text": "Be brief."}]},
                "contents": [
                    {"role": "user", "parts": [{"text": "Weather?"}]},
                    {"role": "model", "parts": [{"functionCall": {
                        "id": "call_1", "name": "get_weather", "args": {"city": "Paris"}
                    }}]},
                    {"role": "user", "parts": [{"functionResponse": {
                        "id": "call_1",
                        "name": "get_weather",
                        "response": {"name": "get_weather", "content": {"temperature": 20}}
                    }}]}
                ]
            })
        );
        assert_eq!(GoogleAdapter.from_payload(&payload).expect("reads back"), messages);
    }

    #[test]
    fn test_missing_ids_are_recovered() {
        let payload: GenerateContentPayload = serde_json::from_value(json!({
            "contents": [
                {"role": "model", "parts": [{"functionCall": {"name": "lookup", "args": {}}}]},
                {"role": "user", "parts": [{"functionResponse": {
                    "name": "lookup", "response": {"name": "lookup", "error": "timeout"}
                }}]}
            ]
        }))
        .expect("valid payload");
        let messages = GoogleAdapter.from_payload(&payload).expect("reads");
        let call = messages[0].tool_calls().next().expect("call");
        let result = messages[1].tool_results().next().expect("result");
        assert_eq!(call.id, "lookup_1");
        assert_eq!(result.id, call.id);
        assert!(result.is_error);
        assert_eq!(result.result, json!("timeout"));
    }

    #[test]
    fn test_url_image_needs_mime() {
        let image = |mime_type: Option<&str>| {
            Message::new(
                Role::User,
                vec![ContentPart::Image {
                    image: "https://example.com/cat.png".to_string(),
                    mime_type: mime_type.map(str::to_string),
                }],
            )
        };
        let err = GoogleAdapter.to_payload(&[image(None)]).expect_err("no mime");
        assert_eq!(err.part, "image");

        let payload = GoogleAdapter.to_payload(&[image(Some("image/png"))]).expect("converts");
        let json = serde_json::to_value(&payload).expect("serializes");
        assert_eq!(
            json["contents"][0]["parts"][0],
            json!({"fileData": {"mimeType": "image/png", "fileUri": "https://example.com/cat.png"}})
        );
    }

    #[test]
    fn test_response_message() {
        let response = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Sunny."}]},
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            GoogleAdapter.response_message(response).expect("model message"),
            Message::assistant("Sunny.")
        );
        let err = GoogleAdapter
            .response_message(json!({"candidates": []}))
            .expect_err("empty");
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }
}
