//! Provider configuration

use crate::estimate::EstimatorKind;
use serde::{Deserialize, Serialize};

/// Streaming API flavour spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WireApi {
    /// `POST /chat/completions` with SSE chunks
    #[default]
    ChatCompletions,
    /// OpenAI `POST /responses` with typed SSE events
    Responses,
}

/// Configuration for a streaming provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name for the provider
    pub name: String,
    /// API base URL (e.g., "https://api.deepseek.com")
    pub base_url: String,
    /// Environment variable name for the API key
    pub api_key_env: String,
    /// Default model to use
    pub default_model: String,
    #[serde(default)]
    pub wire: WireApi,
    /// Ask for usage in the stream (`stream_options.include_usage`)
    #[serde(default = "default_stream_usage")]
    pub stream_usage: bool,
    /// Fallback token counter when the stream carries no usage
    #[serde(default)]
    pub estimator: EstimatorKind,
}

fn default_stream_usage() -> bool {
    true
}

/// Names accepted by [`ProviderConfig::preset`]
pub const PRESET_NAMES: &[&str] = &[
    "openai",
    "deepseek",
    "deepseek-reasoner",
    "moonshot",
    "qwen",
    "glm",
    "doubao",
    "gemini",
    "grok",
];

impl ProviderConfig {
    fn chat(name: &str, base_url: &str, api_key_env: &str, default_model: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            api_key_env: api_key_env.to_string(),
            default_model: default_model.to_string(),
            wire: WireApi::ChatCompletions,
            stream_usage: true,
            estimator: EstimatorKind::Cl100k,
        }
    }

    /// OpenAI via the Responses API
    pub fn openai() -> Self {
        Self {
            wire: WireApi::Responses,
            ..Self::chat("OpenAI", "https://api.openai.com/v1", "OPENAI_API_KEY", "gpt-5-nano")
        }
    }

    pub fn deepseek() -> Self {
        Self::chat(
            "DeepSeek",
            "https://api.deepseek.com",
            "DEEPSEEK_API_KEY",
            "deepseek-chat",
        )
    }

    /// DeepSeek reasoner; streams `reasoning_content` before the answer
    pub fn deepseek_reasoner() -> Self {
        Self {
            default_model: "deepseek-reasoner".to_string(),
            ..Self::deepseek()
        }
    }

    /// Create a Moonshot/Kimi provider config
    pub fn moonshot() -> Self {
        Self::chat(
            "Moonshot",
            "https://api.moonshot.cn/v1",
            "MOONSHOT_API_KEY",
            "kimi-k2-0905-preview",
        )
    }

    /// Alibaba DashScope (Qwen) compatible mode
    pub fn qwen() -> Self {
        Self::chat(
            "Qwen",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
            "DASHSCOPE_API_KEY",
            "qwen-plus",
        )
    }

    /// Zhipu GLM. Usage arrives in the final chunk without `stream_options`.
    pub fn glm() -> Self {
        Self {
            stream_usage: false,
            ..Self::chat(
                "GLM",
                "https://open.bigmodel.cn/api/paas/v4",
                "ZHIPU_API_KEY",
                "glm-4-flash",
            )
        }
    }

    /// Volcano Ark (Doubao)
    pub fn doubao() -> Self {
        Self::chat(
            "Doubao",
            "https://ark.cn-beijing.volces.com/api/v3",
            "ARK_API_KEY",
            "doubao-seed-1-6-250615",
        )
    }

    /// Gemini's OpenAI-compatible endpoint. No stream usage, so counts are estimated.
    pub fn gemini() -> Self {
        Self {
            stream_usage: false,
            ..Self::chat(
                "Gemini",
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "GEMINI_API_KEY",
                "gemini-2.0-flash",
            )
        }
    }

    /// xAI Grok
    pub fn grok() -> Self {
        Self::chat("Grok", "https://api.x.ai/v1", "XAI_API_KEY", "grok-code-fast")
    }

    /// Create a custom provider config (e.g., LM Studio, vLLM)
    pub fn custom(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key_env: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key_env: api_key_env.into(),
            default_model: default_model.into(),
            wire: WireApi::ChatCompletions,
            stream_usage: true,
            estimator: EstimatorKind::Cl100k,
        }
    }

    /// Look up a built-in preset by name (case-insensitive)
    pub fn preset(name: &str) -> Option<Self> {
        let config = match name.to_lowercase().as_str() {
            "openai" | "gpt" => Self::openai(),
            "deepseek" => Self::deepseek(),
            "deepseek-reasoner" => Self::deepseek_reasoner(),
            "moonshot" | "kimi" => Self::moonshot(),
            "qwen" | "dashscope" => Self::qwen(),
            "glm" | "zhipu" => Self::glm(),
            "doubao" | "ark" => Self::doubao(),
            "gemini" => Self::gemini(),
            "grok" | "xai" => Self::grok(),
            _ => return None,
        };
        Some(config)
    }

    /// Endpoint that streams for this provider's wire API
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.wire {
            WireApi::ChatCompletions => format!("{}/chat/completions", base),
            WireApi::Responses => format!("{}/responses", base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_name_resolves() {
        for name in PRESET_NAMES {
            assert!(ProviderConfig::preset(name).is_some(), "missing preset {}", name);
        }
        assert!(ProviderConfig::preset("nope").is_none());
        assert_eq!(ProviderConfig::preset("KIMI").unwrap().name, "Moonshot");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = ProviderConfig::custom("LM Studio", "http://localhost:1234/v1/", "LM_KEY", "local");
        assert_eq!(config.endpoint(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(ProviderConfig::openai().endpoint(), "https://api.openai.com/v1/responses");
    }

    #[test]
    fn test_yaml_defaults() {
        let config: ProviderConfig = serde_yaml::from_str(
            r#"
name: Local
base_url: http://localhost:8080/v1
api_key_env: LOCAL_KEY
default_model: llama
"#,
        )
        .unwrap();
        assert_eq!(config.wire, WireApi::ChatCompletions);
        assert!(config.stream_usage);
        assert_eq!(config.estimator, EstimatorKind::Cl100k);
    }

    #[test]
    fn test_glm_and_gemini_skip_stream_options() {
        assert!(!ProviderConfig::glm().stream_usage);
        assert!(!ProviderConfig::gemini().stream_usage);
        assert!(ProviderConfig::deepseek().stream_usage);
    }
}
