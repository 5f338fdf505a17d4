use crate::error::{InferenceError, truncate_detail};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body sent to the poem service
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoemRequest {
    /// `data:image/jpeg;base64,...`
    pub image: String,
    pub device_id: String,
    pub knob: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poem_format: Option<String>,
}

/// A poem returned by the service
#[derive(Debug, Clone, PartialEq)]
pub struct PoemResult {
    pub text: String,
    pub caption: Option<String>,
}

#[derive(Deserialize)]
struct PoemResponse {
    poem: Option<String>,
    caption: Option<String>,
}

/// Encode a JPEG capture as the data URI the service expects
pub fn encode_image(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

/// Remote inference capability: one attempt, no retries
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn compose(&self, request: &PoemRequest) -> Result<PoemResult, InferenceError>;
}

/// Poem service reached over HTTP with a bounded timeout
pub struct HttpInferenceClient {
    http: Client,
    url: String,
}

impl HttpInferenceClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn compose(&self, request: &PoemRequest) -> Result<PoemResult, InferenceError> {
        tracing::info!(
            url = %self.url,
            knob = request.knob,
            image_len = request.image.len(),
            "Requesting poem"
        );

        let response = self.http.post(&self.url).json(request).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: truncate_detail(&body, 200),
            });
        }

        let body = response.bytes().await?;
        let poem = parse_poem(&body)?;

        tracing::info!("Poem received: {} chars", poem.text.len());
        Ok(poem)
    }
}

/// Extract the poem (and optional caption) from a success body
pub fn parse_poem(body: &[u8]) -> Result<PoemResult, InferenceError> {
    let response: PoemResponse =
        serde_json::from_slice(body).map_err(|e| InferenceError::Malformed(e.to_string()))?;

    let text = response
        .poem
        .filter(|poem| !poem.trim().is_empty())
        .ok_or_else(|| InferenceError::Malformed("response has no poem".to_string()))?;

    Ok(PoemResult {
        text,
        caption: response.caption.filter(|caption| !caption.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> PoemRequest {
        PoemRequest {
            image: encode_image(b"jpeg"),
            device_id: "poetcam-test".to_string(),
            knob: 2,
            poem_format: Some("haiku".to_string()),
        }
    }

    /// Serve one canned HTTP response, returning the request body received
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/poem", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let headers = String::from_utf8_lossy(&received[..header_end]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);

            while received.len() < header_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&received[header_end..]).to_string()
        });

        (url, server)
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["deviceId"], "poetcam-test");
        assert_eq!(json["knob"], 2);
        assert_eq!(json["poemFormat"], "haiku");
        assert_eq!(json["image"], "data:image/jpeg;base64,anBlZw==");
    }

    #[test]
    fn test_request_omits_missing_format() {
        let mut request = request();
        request.poem_format = None;
        let json = serde_json::to_value(request).unwrap();
        assert!(json.get("poemFormat").is_none());
    }

    #[test]
    fn test_parse_poem_with_caption() {
        let poem = parse_poem(br#"{"poem": "roses\nare red", "caption": "a garden"}"#).unwrap();
        assert_eq!(poem.text, "roses\nare red");
        assert_eq!(poem.caption.as_deref(), Some("a garden"));
    }

    #[test]
    fn test_parse_poem_missing_field_is_malformed() {
        assert!(matches!(
            parse_poem(br#"{"caption": "a garden"}"#),
            Err(InferenceError::Malformed(_))
        ));
        assert!(matches!(
            parse_poem(br#"{"poem": "   "}"#),
            Err(InferenceError::Malformed(_))
        ));
        assert!(matches!(
            parse_poem(b"<html>oops</html>"),
            Err(InferenceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_compose_posts_json_and_reads_poem() {
        let (url, server) = serve_once("200 OK", r#"{"poem":"a small poem","caption":"desk"}"#).await;
        let client = HttpInferenceClient::new(&url, Duration::from_secs(5)).unwrap();

        let poem = client.compose(&request()).await.unwrap();
        assert_eq!(poem.text, "a small poem");

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["deviceId"], "poetcam-test");
        assert_eq!(sent["knob"], 2);
    }

    #[tokio::test]
    async fn test_compose_reports_server_error_status() {
        let (url, _server) = serve_once("500 Internal Server Error", "boom").await;
        let client = HttpInferenceClient::new(&url, Duration::from_secs(5)).unwrap();

        match client.compose(&request()).await {
            Err(InferenceError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_compose_reports_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/poem", listener.local_addr().unwrap());
        drop(listener);

        let client = HttpInferenceClient::new(&url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.compose(&request()).await,
            Err(InferenceError::Transport(_))
        ));
    }
}
