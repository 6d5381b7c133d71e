//! Typed view of a document's front matter.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// PROVIDERS
// ============================================================================

/// The closed set of provider wire formats the adapters understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "google" | "gemini" => Ok(ProviderKind::Google),
            _ => Err(ConfigError::UnknownProvider {
                provider: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Settings from the front-matter block.
///
/// Well-known keys are typed; everything else is kept in `extra` and passed
/// through to the host untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(
        default,
        alias = "maxTokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, ToolDefinition>,
    /// JSON Schema the final response must follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PromptConfig {
    /// Build a config from the parsed front-matter mapping.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::InvalidConfig {
                reason: "front matter must be a mapping".to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    /// The provider named in the config, if any.
    pub fn provider_kind(&self) -> Result<Option<ProviderKind>, ConfigError> {
        self.provider.as_deref().map(str::parse).transpose()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// A copy of this config with the given keys replaced.
    pub fn with_overrides(
        &self,
        overrides: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        if overrides.is_empty() {
            return Ok(self.clone());
        }
        let mut merged = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => serde_json::Map::new(),
            Err(e) => {
                return Err(ConfigError::InvalidConfig {
                    reason: e.to_string(),
                })
            }
        };
        for (key, value) in overrides {
            let key = match key.as_str() {
                "maxTokens" => "max_tokens",
                other => other,
            };
            merged.insert(key.to_string(), value.clone());
        }
        Self::from_json(serde_json::Value::Object(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_types_known_keys() {
        let config = PromptConfig::from_json(json!({
            "model": "gpt-4",
            "provider": "openai",
            "maxTokens": 256,
            "tools": {"get_weather": {"description": "Weather lookup"}},
            "top_p": 0.5
        }))
        .expect("valid config");

        assert_eq!(config.model.as_deref(), Some("gpt-4"));
        assert_eq!(config.max_tokens, Some(256));
        assert!(config.has_tool("get_weather"));
        assert_eq!(config.extra.get("top_p"), Some(&json!(0.5)));
        assert_eq!(config.provider_kind(), Ok(Some(ProviderKind::OpenAi)));
    }

    #[test]
    fn test_from_json_rejects_non_mapping() {
        assert!(matches!(
            PromptConfig::from_json(json!(["a"])),
            Err(ConfigError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_with_overrides_replaces_keys() {
        let config = PromptConfig {
            model: Some("gpt-4".to_string()),
            ..Default::default()
        };
        let mut overrides = BTreeMap::new();
        overrides.insert("model".to_string(), json!("gpt-4o-mini"));
        overrides.insert("temperature".to_string(), json!(0.2));

        let merged = config.with_overrides(&overrides).expect("valid overrides");
        assert_eq!(merged.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(merged.temperature, Some(0.2));
    }

    #[test]
    fn test_unknown_provider() {
        let config = PromptConfig {
            provider: Some("acme".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.provider_kind(),
            Err(ConfigError::UnknownProvider { .. })
        ));
    }
}
