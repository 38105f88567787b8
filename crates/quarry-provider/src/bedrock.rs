//! Amazon Bedrock Converse client.
//!
//! Requests go through reqwest and are SigV4-signed by hand so the crate can
//! point at a mock endpoint in tests without swapping the transport.

use std::time::SystemTime;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{ContentBlock, LlmProvider, LlmRequest, LlmResponse};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_MODEL: &str = "us.amazon.nova-pro-v1:0";

const SIGNING_SERVICE: &str = "bedrock";

#[derive(Debug, Clone)]
pub struct BedrockProvider {
    client: reqwest::Client,
    region: String,
    credentials: Credentials,
    endpoint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderErrorKind {
    Throttled,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::Throttled,
            401 | 403 => Self::AuthError,
            400 | 422 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::ServerError | Self::Timeout)
    }
}

impl BedrockProvider {
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        let region = region.into();
        let endpoint = format!("https://bedrock-runtime.{region}.amazonaws.com");
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            region,
            credentials,
            endpoint,
        }
    }

    /// Credentials from the standard AWS environment variables; `AWS_REGION`
    /// overrides `fallback_region` when set.
    pub fn from_env(fallback_region: impl Into<String>) -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| anyhow!("AWS_ACCESS_KEY_ID is not set"))?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| anyhow!("AWS_SECRET_ACCESS_KEY is not set"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| fallback_region.into());
        let credentials =
            Credentials::new(access_key, secret_key, session_token, None, "environment");
        Ok(Self::new(region, credentials))
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Point the provider at a non-AWS base URL. Test hook.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub(crate) fn to_api_request(request: &LlmRequest) -> ApiRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.clone(),
                content: m.content.iter().map(to_api_block).collect(),
            })
            .collect();

        let tool_config = if request.tools.is_empty() {
            None
        } else {
            Some(ToolConfig {
                tools: request
                    .tools
                    .iter()
                    .map(|t| ApiTool {
                        tool_spec: ToolSpec {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            input_schema: InputSchema {
                                json: t.input_schema.clone(),
                            },
                        },
                    })
                    .collect(),
            })
        };

        ApiRequest {
            messages,
            system: request
                .system
                .as_ref()
                .map(|text| vec![SystemBlock { text: text.clone() }]),
            inference_config: InferenceConfig {
                max_tokens: request.max_tokens,
                top_p: request.top_p,
                temperature: request.temperature,
            },
            tool_config,
        }
    }

    fn sign_request(&self, request: &mut http::Request<String>) -> Result<()> {
        let identity: Identity = self.credentials.clone().into();
        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_SERVICE)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()?
            .into();

        let signable = SignableRequest::new(
            request.method().as_str(),
            request.uri().to_string(),
            request
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str(), v.to_str().unwrap_or(""))),
            SignableBody::Bytes(request.body().as_bytes()),
        )?;

        let (instructions, _signature) = sign(signable, &params)?.into_parts();
        instructions.apply_to_request_http1x(request);
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!(
            "{}/model/{}/converse",
            self.endpoint,
            urlencoding::encode(&request.model)
        );
        let payload = Self::to_api_request(&request);
        let body = serde_json::to_string(&payload)?;

        let mut http_req = http::Request::builder()
            .method(http::Method::POST)
            .uri(&url)
            .header("content-type", "application/json")
            .body(body)?;
        self.sign_request(&mut http_req)?;

        let resp = match self.client.execute(reqwest::Request::try_from(http_req)?).await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "bedrock api error (timeout) [retryable]: request timed out after 60s"
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("bedrock api error (connect) [retryable]: {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await?;
            let parsed = serde_json::from_str::<ApiError>(&text).ok();
            return Err(format_api_error(status, parsed));
        }

        let body: ApiResponse = resp.json().await?;
        let content: Vec<ContentBlock> = body
            .output
            .message
            .content
            .iter()
            .filter_map(|block| {
                if let Some(text) = &block.text {
                    Some(ContentBlock::Text { text: text.clone() })
                } else {
                    block.tool_use.as_ref().map(|tu| ContentBlock::ToolUse {
                        id: tu.tool_use_id.clone(),
                        name: tu.name.clone(),
                        input: tu.input.clone(),
                    })
                }
            })
            .collect();
        let text = body
            .output
            .message
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(LlmResponse {
            text,
            content,
            input_tokens: body.usage.as_ref().map(|u| u.input_tokens),
            output_tokens: body.usage.as_ref().map(|u| u.output_tokens),
            stop_reason: body.stop_reason,
        })
    }
}

fn to_api_block(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({"text": text}),
        ContentBlock::ToolUse { id, name, input } => serde_json::json!({
            "toolUse": {"toolUseId": id, "name": name, "input": input}
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => serde_json::json!({
            "toolResult": {
                "toolUseId": tool_use_id,
                "content": [{"text": content}],
                "status": if *is_error { "error" } else { "success" },
            }
        }),
    }
}

fn format_api_error(status: StatusCode, parsed: Option<ApiError>) -> anyhow::Error {
    let kind = ProviderErrorKind::from_status(status);
    let retryable = if kind.is_retryable() {
        " [retryable]"
    } else {
        ""
    };
    if let Some(api_error) = parsed {
        anyhow!("bedrock api error ({status}){retryable}: {}", api_error.message)
    } else {
        anyhow!("bedrock api error ({status}){retryable}")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiRequest {
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemBlock>>,
    pub inference_config: InferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SystemBlock {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InferenceConfig {
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ToolConfig {
    pub tools: Vec<ApiTool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiTool {
    pub tool_spec: ToolSpec,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct InputSchema {
    pub json: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiResponse {
    pub output: ApiOutput,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiOutput {
    pub message: ApiOutputMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiOutputMessage {
    #[serde(default)]
    pub content: Vec<ApiContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiContentBlock {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_use: Option<ApiToolUse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiToolUse {
    pub tool_use_id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LlmMessage, ToolDef};

    fn request_with_tools() -> LlmRequest {
        LlmRequest {
            model: DEFAULT_MODEL.into(),
            system: Some("You are a helpful AI assistant.".into()),
            messages: vec![LlmMessage::user("what time is it in Tokyo?")],
            max_tokens: 300,
            top_p: 0.1,
            temperature: 0.3,
            tools: vec![ToolDef {
                name: "time_get_current_time".into(),
                description: "[time] Get the current time".into(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {"timezone": {"type": "string"}},
                    "required": ["timezone"]
                }),
            }],
        }
    }

    #[test]
    fn request_body_matches_converse_shape() {
        let api = BedrockProvider::to_api_request(&request_with_tools());
        let json = serde_json::to_value(&api).unwrap();

        assert_eq!(json["system"][0]["text"], "You are a helpful AI assistant.");
        assert_eq!(json["inferenceConfig"]["maxTokens"], 300);
        assert!(json["inferenceConfig"]["topP"].as_f64().unwrap() < 0.2);
        assert_eq!(
            json["toolConfig"]["tools"][0]["toolSpec"]["name"],
            "time_get_current_time"
        );
        assert!(json["toolConfig"]["tools"][0]["toolSpec"]["inputSchema"]["json"]["properties"]
            .is_object());
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(
            json["messages"][0]["content"][0]["text"],
            "what time is it in Tokyo?"
        );
    }

    #[test]
    fn request_without_tools_omits_tool_config() {
        let req = LlmRequest::simple(DEFAULT_MODEL.into(), None, "hi".into());
        let json = serde_json::to_value(BedrockProvider::to_api_request(&req)).unwrap();
        assert!(json.get("toolConfig").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn tool_result_block_carries_status() {
        let ok = to_api_block(&ContentBlock::ToolResult {
            tool_use_id: "t1".into(),
            content: "42".into(),
            is_error: false,
        });
        assert_eq!(ok["toolResult"]["status"], "success");
        assert_eq!(ok["toolResult"]["content"][0]["text"], "42");

        let failed = to_api_block(&ContentBlock::ToolResult {
            tool_use_id: "t2".into(),
            content: "tool call timed out".into(),
            is_error: true,
        });
        assert_eq!(failed["toolResult"]["status"], "error");
    }

    #[test]
    fn response_parses_text_and_tool_use() {
        let raw = serde_json::json!({
            "output": {"message": {"role": "assistant", "content": [
                {"text": "Let me check."},
                {"toolUse": {"toolUseId": "tooluse_abc", "name": "time_get_current_time",
                             "input": {"timezone": "Asia/Tokyo"}}}
            ]}},
            "stopReason": "tool_use",
            "usage": {"inputTokens": 12, "outputTokens": 34, "totalTokens": 46}
        });
        let resp: ApiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(resp.output.message.content.len(), 2);
        let tu = resp.output.message.content[1].tool_use.as_ref().unwrap();
        assert_eq!(tu.tool_use_id, "tooluse_abc");
        assert_eq!(resp.usage.unwrap().output_tokens, 34);
    }

    #[test]
    fn error_kind_classification() {
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::TOO_MANY_REQUESTS),
            ProviderErrorKind::Throttled
        );
        assert_eq!(
            ProviderErrorKind::from_status(StatusCode::FORBIDDEN),
            ProviderErrorKind::AuthError
        );
        assert!(ProviderErrorKind::from_status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!ProviderErrorKind::from_status(StatusCode::BAD_REQUEST).is_retryable());
    }

    #[test]
    fn from_env_prefers_aws_region_over_fallback() {
        std::env::set_var("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "secretexample");

        std::env::remove_var("AWS_REGION");
        let provider = BedrockProvider::from_env("eu-central-1").unwrap();
        assert_eq!(provider.region(), "eu-central-1");

        std::env::set_var("AWS_REGION", "ap-northeast-1");
        let provider = BedrockProvider::from_env("eu-central-1").unwrap();
        assert_eq!(provider.region(), "ap-northeast-1");
        std::env::remove_var("AWS_REGION");
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ApiUsageProbe {
        input_tokens: u32,
    }

    #[test]
    fn usage_is_camel_case() {
        let probe: ApiUsageProbe =
            serde_json::from_value(serde_json::json!({"inputTokens": 7})).unwrap();
        assert_eq!(probe.input_tokens, 7);
    }
}
