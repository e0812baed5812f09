use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::types::{AnalysisRequest, AnalysisResult, ReportMode};
use super::AnalysisError;
use crate::config::EngineConfig;

/// External analysis engine (LLM reasoning + web search + database access).
///
/// `Ok(None)` means the engine produced no report for this request (invalid
/// stock code, upstream gave up). Retries, if any, are the engine's business.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn invoke(&self, request: &AnalysisRequest)
        -> Result<Option<AnalysisResult>, AnalysisError>;
}

/// HTTP adapter for an engine exposed as a JSON service.
pub struct HttpAnalysisEngine {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

/// Request body for `POST /api/analyze`
#[derive(Serialize)]
struct AnalyzeRequestBody<'a> {
    request_id: Uuid,
    stock_code: &'a str,
    report_mode: ReportMode,
    context: &'a str,
}

impl HttpAnalysisEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::HttpClient(e.to_string()))?;

        Ok(Self::with_client(config, client))
    }

    /// Use a preconfigured client (proxy, TLS, pooling). The client's own
    /// timeout applies; `config.timeout_secs` is only used for reporting.
    pub fn with_client(config: &EngineConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: config.timeout_secs,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> AnalysisError {
        if e.is_connect() {
            AnalysisError::EngineConnection(self.base_url.clone())
        } else if e.is_timeout() {
            AnalysisError::EngineTimeout(self.timeout_secs)
        } else {
            AnalysisError::HttpClient(e.to_string())
        }
    }
}

#[async_trait]
impl AnalysisEngine for HttpAnalysisEngine {
    async fn invoke(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Option<AnalysisResult>, AnalysisError> {
        let url = format!("{}/api/analyze", self.base_url);
        let body = AnalyzeRequestBody {
            request_id: request.request_id(),
            stock_code: request.stock_code(),
            report_mode: request.report_mode(),
            context: request.context_text(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(
                request_id = %request.request_id(),
                status = status.as_u16(),
                "Engine reported no result"
            );
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::EngineStatus {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::ResponseParsing(e.to_string()))?;

        AnalysisResult::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::attribution::build;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response; the handle yields the raw request.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if request_complete(&received) {
                    break;
                }
            }

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&received).into_owned()
        });

        (format!("http://{addr}"), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    fn engine_for(base_url: String) -> HttpAnalysisEngine {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        HttpAnalysisEngine::with_client(
            &EngineConfig {
                base_url,
                timeout_secs: 5,
            },
            client,
        )
    }

    #[test]
    fn new_trims_trailing_slash() {
        let engine = HttpAnalysisEngine::new(&EngineConfig {
            base_url: "http://engine:8000/".into(),
            timeout_secs: 1,
        })
        .unwrap();
        assert_eq!(engine.base_url, "http://engine:8000");
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("600519", ReportMode::Full, build("", "x"))
    }

    #[tokio::test]
    async fn posts_request_and_parses_result() {
        let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"analysis":"原文..."}"#).await;
        let engine = engine_for(url);
        let request = request();

        let result = engine.invoke(&request).await.unwrap().unwrap();
        assert_eq!(result.get_str("analysis"), Some("原文..."));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/analyze"));
        assert!(raw.contains("\"stock_code\":\"600519\""));
        assert!(raw.contains("\"report_mode\":\"full\""));
        assert!(raw.contains(&request.request_id().to_string()));
    }

    #[tokio::test]
    async fn null_body_is_no_result() {
        let (url, _server) = serve_once("HTTP/1.1 200 OK", "null").await;
        assert!(engine_for(url).invoke(&request()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn not_found_is_no_result() {
        let (url, _server) = serve_once("HTTP/1.1 404 Not Found", "{}").await;
        assert!(engine_for(url).invoke(&request()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let (url, _server) =
            serve_once("HTTP/1.1 502 Bad Gateway", r#"{"detail":"upstream"}"#).await;
        let err = engine_for(url).invoke(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::EngineStatus { status: 502, .. }));
    }

    #[tokio::test]
    async fn unreachable_engine_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = engine_for(format!("http://{addr}"))
            .invoke(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EngineConnection(_)));
    }
}
