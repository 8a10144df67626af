use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tokio::time::sleep;

use crate::errors::{CliError, with_debug_hint};

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    retries: u32,
    debug: bool,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub request_id: Option<String>,
    pub elapsed_ms: u128,
    pub json: Value,
}

impl ApiClient {
    pub fn new(
        base_url: String,
        timeout_ms: u64,
        retries: u32,
        debug: bool,
    ) -> Result<Self, CliError> {
        let timeout = Duration::from_millis(timeout_ms.max(1));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            retries,
            debug,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_json(&self, path: &str) -> Result<ApiResponse, CliError> {
        self.request_json(Method::GET, path, None, true).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, CliError> {
        self.request_json(Method::POST, path, body, false).await
    }

    pub async fn delete_json(&self, path: &str) -> Result<ApiResponse, CliError> {
        self.request_json(Method::DELETE, path, None, true).await
    }

    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        idempotent: bool,
    ) -> Result<ApiResponse, CliError> {
        let url = join_url(&self.base_url, path);
        let max_attempts = if idempotent {
            self.retries.saturating_add(1)
        } else {
            1
        };

        for attempt in 0..max_attempts {
            let started = Instant::now();
            let mut request = self.client.request(method.clone(), url.clone());

            if let Some(ref payload) = body {
                request = request.json(payload);
            }

            tracing::debug!(%method, %url, attempt, "api_request");
            let response = request.send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let request_id = resp
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string());

                    let text = match resp.text().await {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(%url, error = %err, "api_body_error");
                            return Err(CliError::Network(with_debug_hint(
                                &format!("Failed reading response body: {err}"),
                                self.debug,
                            )));
                        }
                    };
                    tracing::debug!(
                        %method,
                        %url,
                        status = status.as_u16(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "api_response"
                    );

                    if is_retryable_status(status) && idempotent && attempt + 1 < max_attempts {
                        tracing::info!(status = status.as_u16(), attempt, "retrying request");
                        sleep(backoff_delay_ms(attempt)).await;
                        continue;
                    }

                    let parsed = if text.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str::<Value>(&text)
                            .unwrap_or_else(|_| json!({ "raw": text }))
                    };

                    if status.is_success() {
                        return Ok(ApiResponse {
                            request_id,
                            elapsed_ms: started.elapsed().as_millis(),
                            json: parsed,
                        });
                    }

                    tracing::warn!(%url, status = status.as_u16(), body = %parsed, "api_error");
                    return Err(self.http_error(status, request_id, parsed));
                }
                Err(err) => {
                    let transient = err.is_timeout() || err.is_connect() || err.is_request();
                    if transient && idempotent && attempt + 1 < max_attempts {
                        tracing::info!(error = %err, attempt, "retrying request");
                        sleep(backoff_delay_ms(attempt)).await;
                        continue;
                    }

                    tracing::warn!(%url, error = %err, "api_transport_error");
                    let message = if err.is_timeout() {
                        "Request timed out.".to_string()
                    } else {
                        format!("Network request failed: {err}")
                    };
                    return Err(CliError::Network(with_debug_hint(&message, self.debug)));
                }
            }
        }

        Err(CliError::Network(with_debug_hint(
            "Request failed after retries.",
            self.debug,
        )))
    }

    fn http_error(
        &self,
        status: StatusCode,
        request_id: Option<String>,
        payload: Value,
    ) -> CliError {
        let message = payload
            .get("detail")
            .and_then(|v| v.as_str())
            .or_else(|| payload.get("error").and_then(|v| v.as_str()))
            .or_else(|| payload.get("message").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

        let mut details = message;
        if let Some(id) = request_id {
            details.push_str(&format!(" (request_id: {id})"));
        }
        if self.debug {
            details.push_str(&format!(" payload={payload}"));
        } else {
            details = with_debug_hint(&details, false);
        }

        match status.as_u16() {
            400 | 422 => CliError::Usage(details),
            404 => CliError::NotFound(details),
            429 => CliError::RateLimited(details),
            500..=599 => CliError::Server(details),
            _ => CliError::Generic(details),
        }
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn backoff_delay_ms(attempt: u32) -> Duration {
    let pow = attempt.min(6);
    let factor = 1u64 << pow;
    Duration::from_millis(200 * factor)
}


#[cfg(test)]
mod tests {
    use super::test_server::{CannedResponse, serve};
    use super::*;

    #[test]
    fn join_url_trims_slashes() {
        assert_eq!(
            join_url("http://localhost:8000/", "/personalities/active-users"),
            "http://localhost:8000/personalities/active-users"
        );
        assert_eq!(
            join_url("http://localhost:8000", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay_ms(0), Duration::from_millis(200));
        assert_eq!(backoff_delay_ms(2), Duration::from_millis(800));
        assert_eq!(backoff_delay_ms(10), Duration::from_millis(200 * 64));
    }

    #[tokio::test]
    async fn success_returns_parsed_json_and_request_id() {
        let (base, captured) = serve(vec![CannedResponse::json(200, r#"{"ok":true}"#)]).await;
        let api = ApiClient::new(base, 5_000, 0, false).unwrap();

        let res = api.get_json("/health").await.unwrap();
        assert_eq!(res.json["ok"], json!(true));
        assert_eq!(res.request_id.as_deref(), Some("req-1"));
        assert_eq!(
            captured.lock().unwrap()[0].request_line,
            "GET /health HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn status_codes_map_to_error_variants() {
        let (base, _) = serve(vec![
            CannedResponse::json(404, r#"{"detail":"User not found"}"#),
            CannedResponse::json(500, r#"{"error":"boom"}"#),
        ])
        .await;
        let api = ApiClient::new(base, 5_000, 0, true).unwrap();

        let err = api.post_json("/a", None).await.unwrap_err();
        assert!(matches!(err, CliError::NotFound(ref m) if m.starts_with("User not found")));

        let err = api.post_json("/b", None).await.unwrap_err();
        assert!(matches!(err, CliError::Server(ref m) if m.starts_with("boom")));
    }

    #[tokio::test]
    async fn idempotent_requests_retry_on_unavailable() {
        let (base, captured) = serve(vec![
            CannedResponse::json(503, "{}"),
            CannedResponse::json(200, "[]"),
        ])
        .await;
        let api = ApiClient::new(base, 5_000, 1, false).unwrap();

        let res = api.get_json("/personalities/active-users").await.unwrap();
        assert_eq!(res.json, json!([]));
        assert_eq!(captured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreadable_body_is_a_network_error() {
        let (base, _) = serve(vec![CannedResponse::truncated(200, r#"{"answers":["#)]).await;
        let api = ApiClient::new(base, 5_000, 0, false).unwrap();

        let err = api.post_json("/x", None).await.unwrap_err();
        assert!(matches!(
            err,
            CliError::Network(ref m) if m.starts_with("Failed reading response body")
        ));
    }

    #[tokio::test]
    async fn posts_are_not_retried() {
        let (base, captured) = serve(vec![
            CannedResponse::json(503, "{}"),
            CannedResponse::json(200, "{}"),
        ])
        .await;
        let api = ApiClient::new(base, 5_000, 3, false).unwrap();

        let err = api.post_json("/x", Some(json!({"q": 1}))).await.unwrap_err();
        assert!(matches!(err, CliError::Server(_)));
        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].body, r#"{"q":1}"#);
    }
}
