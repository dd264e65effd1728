/// LLM Client: the single point of entry for all Claude API calls in cvbias.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Judges and extractors receive an `LlmClient` by construction. Documents reach the
/// model through the Files API: uploaded, referenced by id, then deleted.
///
/// Model: claude-sonnet-4-5 (hardcoded so every run of a study uses the same judge)
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_FILES_URL: &str = "https://api.anthropic.com/v1/files";
const FILES_API_BETA: &str = "files-api-2025-04-14";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls in cvbias.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;
/// Audits must be repeatable across runs.
const TEMPERATURE: f32 = 0.0;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("could not read document: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a, C: Serialize> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a, C>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a, C: Serialize> {
    role: &'a str,
    content: C,
}

/// Content blocks of a message that carries an uploaded document.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Document { source: DocumentSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DocumentSource<'a> {
    File { file_id: &'a str },
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

/// A file held by the Files API until `delete_file` is called.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

async fn api_error(response: reqwest::Response) -> LlmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<AnthropicError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    LlmError::Api { status, message }
}

/// Wraps the Anthropic Messages API with retry logic and structured output helpers.
/// Constructed once per command and handed to the judge or extractor that needs it.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String, request_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, api_key })
    }

    fn request(&self, method: reqwest::Method, url: &str, beta: Option<&str>) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        match beta {
            Some(beta) => builder.header("anthropic-beta", beta),
            None => builder,
        }
    }

    /// Makes a raw call to the Claude API, returning the full response object.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };
        self.post_messages(&request_body, None).await
    }

    /// Asks about a document previously uploaded with `upload_file`.
    pub async fn call_with_document(
        &self,
        file_id: &str,
        prompt: &str,
        system: &str,
    ) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![
                    ContentPart::Document {
                        source: DocumentSource::File { file_id },
                    },
                    ContentPart::Text { text: prompt },
                ],
            }],
        };
        self.post_messages(&request_body, Some(FILES_API_BETA)).await
    }

    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    async fn post_messages<B: Serialize>(
        &self,
        request_body: &B,
        beta: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .request(reqwest::Method::POST, ANTHROPIC_API_URL, beta)
                .header("content-type", "application/json")
                .json(request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                return Err(api_error(response).await);
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Uploads a PDF to the Files API. The caller owns the returned file and must delete it.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadedFile, LlmError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());
        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")?;

        let response = self
            .request(reqwest::Method::POST, ANTHROPIC_FILES_URL, Some(FILES_API_BETA))
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let uploaded: UploadedFile = response.json().await?;
        debug!(file_id = %uploaded.id, filename = %uploaded.filename, "file uploaded");
        Ok(uploaded)
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), LlmError> {
        let url = format!("{ANTHROPIC_FILES_URL}/{file_id}");
        let response = self
            .request(reqwest::Method::DELETE, &url, Some(FILES_API_BETA))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(())
    }

    /// Calls the LLM and returns the text of the first text block, fences stripped.
    pub async fn call_text(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        Ok(strip_json_fences(text).to_string())
    }

    /// Convenience method that calls the LLM and deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.call_text(prompt, system).await?;
        serde_json::from_str(&text).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"coherent\": true}\n```";
        assert_eq!(strip_json_fences(input), "{\"coherent\": true}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n[1, 2]\n```";
        assert_eq!(strip_json_fences(input), "[1, 2]");
    }

    #[test]
    fn test_strip_json_fences_unterminated() {
        let input = "```json\n{\"coherent\": false}";
        assert_eq!(strip_json_fences(input), "{\"coherent\": false}");
    }

    #[test]
    fn test_response_text_picks_first_text_block() {
        let response: LlmResponse = serde_json::from_str(
            r#"{"content":[{"type":"tool_use"},{"type":"text","text":"{}"}],
                "usage":{"input_tokens":3,"output_tokens":1}}"#,
        )
        .unwrap();
        assert_eq!(response.text(), Some("{}"));
    }

    #[test]
    fn test_document_message_shape() {
        let parts = vec![
            ContentPart::Document {
                source: DocumentSource::File { file_id: "file_1" },
            },
            ContentPart::Text { text: "extract" },
        ];
        assert_eq!(
            serde_json::to_value(&parts).unwrap(),
            serde_json::json!([
                {"type": "document", "source": {"type": "file", "file_id": "file_1"}},
                {"type": "text", "text": "extract"}
            ])
        );
    }

    #[test]
    fn test_client_builds_with_timeout() {
        assert!(LlmClient::new("sk-test".to_string(), Duration::from_secs(5)).is_ok());
    }
}
