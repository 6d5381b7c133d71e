//! YAML front matter → JSON mapping → typed [`PromptConfig`]

use crate::parser::ast::{ConfigBlock, Document};
use quill_core::{ConfigError, PromptConfig};

// ============================================================================
// DECODING (serde_yaml does the heavy lifting)
// ============================================================================

/// Decode the text between the `---` fences into a JSON object.
///
/// An empty block decodes to `{}`. Anything that is not a mapping, or that
/// does not fit the typed config keys, is rejected with a human readable
/// reason.
pub fn decode_front_matter(raw: &str) -> Result<serde_json::Value, String> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }

    let value: serde_json::Value =
        serde_yaml::from_str(raw).map_err(|e| format!("YAML parse error: {}", e))?;
    let value = match value {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        serde_json::Value::Object(_) => value,
        other => {
            return Err(format!(
                "front matter must be a mapping, found {}",
                json_kind(&other)
            ))
        }
    };

    PromptConfig::from_json(value.clone()).map_err(|e| e.to_string())?;
    Ok(value)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}

impl ConfigBlock {
    /// Typed view of this block.
    pub fn prompt_config(&self) -> Result<PromptConfig, ConfigError> {
        PromptConfig::from_json(self.value.clone())
    }
}

impl Document {
    /// Typed config of the document; the default config when there is no
    /// front matter.
    pub fn prompt_config(&self) -> Result<PromptConfig, ConfigError> {
        self.config()
            .map(ConfigBlock::prompt_config)
            .unwrap_or_else(|| Ok(PromptConfig::default()))
    }
}
