//! OpenAI-compatible chat completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;

use super::{ChatMessage, CompletionProvider, CompletionRequest, DeltaStream};
use crate::config::ProviderConfig;
use crate::constants::{CHAT_COMPLETIONS_PATH, MAX_ERROR_BODY_BYTES};
use crate::error::{ConfigError, ProviderError};
use crate::provider::sse::decode_deltas;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    temperature: f32,
    stream: bool,
    messages: &'a [ChatMessage],
}

/// Streams chat completions from an OpenAI-compatible HTTP API.
///
/// Cloning is cheap and clones share one connection pool, so a single instance serves every
/// concurrent request.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    config: ProviderConfig,
}

impl OpenAiProvider {
    /// Builds the provider and its pooled HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the TLS backend cannot be initialised.
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self::with_client(client, config))
    }

    /// Builds the provider around an existing HTTP client.
    pub fn with_client(client: Client, config: ProviderConfig) -> Self {
        let endpoint = format!(
            "{}{}",
            config.base_url().trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        );

        Self {
            client,
            endpoint,
            config,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<DeltaStream, ProviderError> {
        let body = ChatCompletionBody {
            model: &request.model,
            temperature: request.temperature,
            stream: true,
            messages: &request.messages,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "opening streamed completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.config.api_key().expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: truncate_utf8(text.trim(), MAX_ERROR_BODY_BYTES).to_owned(),
            });
        }

        Ok(decode_deltas(response.bytes_stream()).boxed())
    }
}

fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;
    use crate::provider::ChatRole;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn config(base_url: &str) -> ProviderConfig {
        ProviderConfig::new(ApiKey::new("sk-test-secret").unwrap(), base_url).unwrap()
    }

    fn completion_request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".into(),
            temperature: 0.2,
            messages: vec![ChatMessage::system("instruções")],
        }
    }

    /// Serves one canned HTTP response on an ephemeral port and hands back the raw request.
    async fn serve_once(
        status_line: &str,
        content_type: &str,
        body: String,
    ) -> (OpenAiProvider, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&raw).to_ascii_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });

        let client = Client::builder().no_proxy().build().unwrap();
        let provider = OpenAiProvider::with_client(client, config(&format!("http://{addr}/v1")));
        (provider, handle)
    }

    #[test]
    fn test_endpoint_joins_base_url_without_double_slash() {
        let provider = OpenAiProvider::new(config("https://api.openai.com/v1/")).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let provider = OpenAiProvider::new(config("http://localhost:8080/v1")).unwrap();
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-test-secret"));
        assert!(debug.contains("localhost:8080"));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![
            ChatMessage::system("instruções"),
            ChatMessage {
                role: ChatRole::User,
                content: "dor de garganta".into(),
            },
        ];
        let body = ChatCompletionBody {
            model: "gpt-4o",
            temperature: 0.2,
            stream: true,
            messages: &messages,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "dor de garganta");
    }

    #[tokio::test]
    async fn test_error_status_carries_truncated_body() {
        let body = "x".repeat(MAX_ERROR_BODY_BYTES + 200);
        let (provider, server) = serve_once("401 Unauthorized", "application/json", body).await;

        let err = match provider.stream_completion(completion_request()).await {
            Ok(_) => panic!("expected a status error"),
            Err(err) => err,
        };

        match err {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message.len(), MAX_ERROR_BODY_BYTES);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_streamed_completion_over_http() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Olá\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" mundo\"}}]}\n\n",
            "data: [DONE]\n\n",
        )
        .to_string();
        let (provider, server) = serve_once("200 OK", "text/event-stream", body).await;

        let stream = match provider.stream_completion(completion_request()).await {
            Ok(stream) => stream,
            Err(err) => panic!("unexpected error: {err:?}"),
        };
        let deltas: Vec<_> = stream.collect().await;

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].as_ref().unwrap(), "Olá");
        assert_eq!(deltas[1].as_ref().unwrap(), " mundo");

        let raw = server.await.unwrap();
        let lowered = raw.to_ascii_lowercase();
        assert!(raw.starts_with("POST /v1/chat/completions "));
        assert!(lowered.contains("authorization: bearer sk-test-secret"));
        assert!(raw.contains("\"stream\":true"));
        assert!(raw.contains("\"model\":\"gpt-4o\""));
    }

    #[test]
    fn test_truncate_utf8_respects_char_boundaries() {
        assert_eq!(truncate_utf8("abc", 10), "abc");
        assert_eq!(truncate_utf8("açúcar", 2), "a");
        assert_eq!(truncate_utf8("açúcar", 3), "aç");
    }
}
