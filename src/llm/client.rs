use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::settings::{LlmConfig, LlmProvider};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(
        "No {provider} API key found. Either:\n  - Set {env_var} in ~/.repty/env\n  - Or run: repty config set-key YOUR_KEY"
    )]
    MissingCredential {
        provider: &'static str,
        env_var: &'static str,
    },
    #[error("Failed to call {provider} API: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiResponse {
    /// Every text part of every candidate, joined in order.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect()
    }
}

/// Send one instruction + payload pair to the configured provider and return
/// the raw text reply.
pub async fn call_llm(
    config: &LlmConfig,
    system_context: &str,
    user_prompt: &str,
) -> Result<String, LlmError> {
    let text = match config.provider {
        LlmProvider::Anthropic => call_anthropic(config, system_context, user_prompt).await?,
        LlmProvider::Bedrock => call_bedrock(config, system_context, user_prompt).await?,
        LlmProvider::Gemini => call_gemini(config, system_context, user_prompt).await?,
    };
    Ok(text)
}

async fn call_anthropic(
    config: &LlmConfig,
    system_context: &str,
    user_prompt: &str,
) -> Result<String, LlmError> {
    const PROVIDER: &str = "Anthropic";
    let api_key = config
        .resolve_api_key()
        .ok_or(LlmError::MissingCredential {
            provider: PROVIDER,
            env_var: "ANTHROPIC_API_KEY",
        })?;

    let client = reqwest::Client::new();
    let url = format!("{}/v1/messages", config.base_url());

    let request = AnthropicRequest {
        model: config.model().to_string(),
        max_tokens: 2048,
        system: system_context.to_string(),
        messages: vec![AnthropicMessage {
            role: "user".to_string(),
            content: user_prompt.to_string(),
        }],
    };

    let response = client
        .post(&url)
        .header("x-api-key", &api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| transport(PROVIDER, e))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            provider: PROVIDER,
            status,
            body,
        });
    }

    let msg: AnthropicResponse = response.json().await.map_err(|e| transport(PROVIDER, e))?;

    let text = msg
        .content
        .into_iter()
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("");

    non_empty(PROVIDER, text)
}

async fn call_gemini(
    config: &LlmConfig,
    system_context: &str,
    user_prompt: &str,
) -> Result<String, LlmError> {
    const PROVIDER: &str = "Gemini";
    let api_key = config
        .resolve_api_key()
        .ok_or(LlmError::MissingCredential {
            provider: PROVIDER,
            env_var: "GEMINI_API_KEY",
        })?;

    let client = reqwest::Client::new();
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        config.base_url(),
        config.model()
    );

    let request = GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart {
                text: Some(format!("{}\n\n{}", system_context, user_prompt)),
            }],
        }],
        generation_config: GeminiGenerationConfig {
            response_mime_type: "application/json".to_string(),
        },
    };

    let response = client
        .post(&url)
        .header("x-goog-api-key", &api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| transport(PROVIDER, e))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            provider: PROVIDER,
            status,
            body,
        });
    }

    let reply: GeminiResponse = response.json().await.map_err(|e| transport(PROVIDER, e))?;

    non_empty(PROVIDER, reply.into_text())
}

async fn call_bedrock(
    config: &LlmConfig,
    system_context: &str,
    user_prompt: &str,
) -> Result<String, LlmError> {
    use aws_sdk_bedrockruntime::types::{ContentBlock, ConversationRole, Message};

    const PROVIDER: &str = "Bedrock";

    let region = config.aws_region.as_deref().unwrap_or("us-east-1");

    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await;

    let client = aws_sdk_bedrockruntime::Client::new(&sdk_config);

    let user_content = format!("{}\n\n{}", system_context, user_prompt);

    let message = Message::builder()
        .role(ConversationRole::User)
        .content(ContentBlock::Text(user_content))
        .build()
        .map_err(|e| transport(PROVIDER, e))?;

    let response = client
        .converse()
        .model_id(config.model())
        .messages(message)
        .send()
        .await
        .map_err(|e| transport(PROVIDER, e))?;

    let output = response.output().ok_or(LlmError::EmptyResponse(PROVIDER))?;

    let reply = output
        .as_message()
        .map_err(|_| LlmError::EmptyResponse(PROVIDER))?;

    let text = reply
        .content()
        .iter()
        .filter_map(|block| block.as_text().ok().map(|s| s.as_str()))
        .collect::<Vec<_>>()
        .join("");

    non_empty(PROVIDER, text)
}

fn transport(provider: &'static str, e: impl std::fmt::Display) -> LlmError {
    LlmError::Transport {
        provider,
        message: e.to_string(),
    }
}

fn non_empty(provider: &'static str, text: String) -> Result<String, LlmError> {
    if text.trim().is_empty() {
        Err(LlmError::EmptyResponse(provider))
    } else {
        Ok(text)
    }
}
