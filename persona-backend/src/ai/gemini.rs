use crate::ai::{GenerationConfig, TextGenerator, TextStream};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Google Gemini REST client
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if any
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        Some(
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>(),
        )
    }
}

impl GeminiClient {
    pub fn new(api_key: &str, endpoint: &str, model: &str) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let key_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        headers.insert("x-goog-api-key", key_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.endpoint, self.model, method)
    }

    async fn send(
        &self,
        url: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<reqwest::Response, String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: config,
        };

        log::info!(
            "[GEMINI] Sending request to model {} (prompt_len: {})",
            self.model,
            prompt.len()
        );
        log::debug!("[GEMINI] Prompt:\n{}", prompt);

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Gemini API request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                return Err(format!("Gemini API error: {}", error_response.error.message));
            }

            return Err(format!(
                "Gemini API returned error status: {}, body: {}",
                status, error_text
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, String> {
        let response = self.send(&self.url("generateContent"), prompt, config).await?;

        let response_text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read Gemini response: {}", e))?;
        log::debug!("[GEMINI] Raw response:\n{}", response_text);

        let data: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| format!("Failed to parse Gemini response: {} - body: {}", e, response_text))?;

        let text = data
            .text()
            .ok_or_else(|| "Gemini API returned no candidates".to_string())?;
        log::info!("[GEMINI] Response - content_len: {}", text.len());
        Ok(text)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<TextStream, String> {
        let url = format!("{}?alt=sse", self.url("streamGenerateContent"));
        let response = self.send(&url, prompt, config).await?;

        let bytes = Box::pin(response.bytes_stream());
        let state = (bytes, SseParser::default(), VecDeque::new(), false);

        let chunks = stream::unfold(state, |(mut bytes, mut parser, mut pending, mut done)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, parser, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(parser.push(&chunk)),
                    Some(Err(e)) => {
                        pending.push_back(Err(format!("Gemini stream failed: {}", e)));
                        done = true;
                    }
                    None => {
                        pending.extend(parser.finish());
                        done = true;
                    }
                }
            }
        });

        Ok(chunks.boxed())
    }
}

/// Incremental parser for `alt=sse` responses. Lines may be split across
/// network chunks, so bytes are buffered until a newline arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed a chunk; returns the text of every complete event in it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, String>> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = Self::parse_line(&line) {
                out.push(item);
            }
        }
        out
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Vec<Result<String, String>> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line).into_iter().collect()
    }

    fn parse_line(line: &[u8]) -> Option<Result<String, String>> {
        let line = String::from_utf8_lossy(line);
        let data = line.trim().strip_prefix("data:")?.trim();
        if data.is_empty() || data == "[DONE]" {
            return None;
        }

        if let Ok(error) = serde_json::from_str::<GeminiErrorResponse>(data) {
            return Some(Err(format!("Gemini API error: {}", error.error.message)));
        }

        match serde_json::from_str::<GenerateContentResponse>(data) {
            Ok(event) => event.text().filter(|t| !t.is_empty()).map(Ok),
            Err(e) => Some(Err(format!("Failed to parse Gemini stream event: {}", e))),
        }
    }
}
