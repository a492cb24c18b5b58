//! HubSpot HTTP client with rate-limit retry
//!
//! Every CRM call in the bridge funnels through [`HubSpotClient::request`],
//! which recognizes HubSpot's rate-limit responses (HTTP 429, or error bodies
//! tagged `RATE_LIMIT` / `SECONDLY`) and retries in place: the server's
//! `Retry-After` wins when present, otherwise exponential backoff from the
//! configured base, capped at 30 seconds. Exhausting the retry budget
//! escalates to `Error::RateLimited` and the current run phase aborts.

use super::types::ErrorBody;
use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tcb_common::config::SyncConfig;
use tcb_common::{Error, Result};
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_BACKOFF_MS: u64 = 30_000;

/// Authenticated HubSpot API client.
pub struct HubSpotClient {
    http: reqwest::Client,
    config: SyncConfig,
}

impl HubSpotClient {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = &config.hubspot.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::Config("HubSpot token contains invalid characters".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// True when writes should be captured locally instead of sent.
    pub fn dry_run(&self) -> bool {
        !self.config.hubspot.send_enabled || self.config.hubspot.token.is_none()
    }

    /// Soft throttle between single-record calls.
    pub(crate) async fn throttle(&self) {
        let ms = self.config.rate.search_throttle_ms;
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Pause between successive batch submissions.
    pub(crate) async fn batch_pause(&self) {
        let ms = self.config.rate.batch_delay_ms;
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
        label: &str,
    ) -> Result<T> {
        let value = self
            .request(Method::GET, path, Some(query), None, label)
            .await?;
        decode(value, label)
    }

    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
        label: &str,
    ) -> Result<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| Error::Internal(format!("encode {label}: {e}")))?;
        let value = self
            .request(Method::POST, path, None, Some(&body), label)
            .await?;
        decode(value, label)
    }

    pub(crate) async fn patch_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
        label: &str,
    ) -> Result<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| Error::Internal(format!("encode {label}: {e}")))?;
        let value = self
            .request(Method::PATCH, path, None, Some(&body), label)
            .await?;
        decode(value, label)
    }

    /// Send one request, retrying rate-limit responses in place.
    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(String, String)]>,
        body: Option<&serde_json::Value>,
        label: &str,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.config.hubspot.base_url, path);
        let max_retries = self.config.rate.retry_max;

        for attempt in 0..=max_retries {
            let mut req = self.http.request(method.clone(), &url);
            if let Some(q) = query {
                req = req.query(q);
            }
            if let Some(b) = body {
                req = req.json(b);
            }

            let response = req.send().await?;
            let status = response.status();

            if status.is_success() {
                if status == StatusCode::NO_CONTENT {
                    return Ok(serde_json::Value::Null);
                }
                return Ok(response.json().await?);
            }

            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());

            let text = response.text().await.unwrap_or_default();
            let error_body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

            if is_rate_limited(status, &error_body) {
                if attempt == max_retries {
                    return Err(Error::RateLimited {
                        context: format!("{label} {path} after {} attempts", attempt + 1),
                    });
                }
                let wait_ms = backoff_ms(attempt, retry_after, self.config.rate.retry_base_ms);
                warn!(
                    label,
                    path,
                    attempt = attempt + 1,
                    max = max_retries + 1,
                    wait_ms,
                    "Rate limited by HubSpot, backing off"
                );
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                continue;
            }

            return Err(classify_failure(status, path, error_body, &text));
        }

        unreachable!("retry loop returns on the final attempt")
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value, label: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Internal(format!("decode {label}: {e}")))
}

/// HubSpot signals throttling with 429 or a tagged error body.
fn is_rate_limited(status: StatusCode, body: &ErrorBody) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || body.error_type.as_deref() == Some("RATE_LIMIT")
        || body.policy_name.as_deref() == Some("SECONDLY")
}

/// Wait before the next attempt: server-specified delay wins, otherwise
/// exponential backoff capped at 30 s.
fn backoff_ms(attempt: u32, retry_after_secs: Option<u64>, base_ms: u64) -> u64 {
    match retry_after_secs {
        Some(secs) if secs > 0 => secs * 1000,
        _ => (base_ms.saturating_mul(1u64 << attempt.min(16))).min(MAX_BACKOFF_MS),
    }
}

fn classify_failure(
    status: StatusCode,
    path: &str,
    body: ErrorBody,
    raw: &str,
) -> Error {
    if status == StatusCode::NOT_FOUND {
        return Error::NotFound(path.to_string());
    }
    if let Some(category) = body.category {
        return Error::Validation {
            category,
            message: body.message.unwrap_or_default(),
        };
    }
    let snippet: String = raw.chars().take(200).collect();
    Error::Internal(format!("HubSpot {status} on {path}: {snippet}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_header_overrides_backoff() {
        // Retry-After: 2 must wait at least 2000 ms
        assert_eq!(backoff_ms(0, Some(2), 700), 2000);
        assert_eq!(backoff_ms(5, Some(2), 700), 2000);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_ms(0, None, 700), 700);
        assert_eq!(backoff_ms(1, None, 700), 1400);
        assert_eq!(backoff_ms(2, None, 700), 2800);
        assert_eq!(backoff_ms(10, None, 700), MAX_BACKOFF_MS);
        // Retry-After of 0 falls back to the computed delay
        assert_eq!(backoff_ms(1, Some(0), 700), 1400);
    }

    #[test]
    fn rate_limit_detection_covers_status_and_body_tags() {
        let empty = ErrorBody::default();
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &empty));
        assert!(!is_rate_limited(StatusCode::BAD_REQUEST, &empty));

        let tagged = ErrorBody {
            error_type: Some("RATE_LIMIT".into()),
            ..Default::default()
        };
        assert!(is_rate_limited(StatusCode::BAD_REQUEST, &tagged));

        let secondly = ErrorBody {
            policy_name: Some("SECONDLY".into()),
            ..Default::default()
        };
        assert!(is_rate_limited(StatusCode::OK, &secondly));
    }

    #[test]
    fn validation_bodies_classify_with_category() {
        let err = classify_failure(
            StatusCode::BAD_REQUEST,
            "/crm/v3/objects/contacts/batch/upsert",
            ErrorBody {
                category: Some("VALIDATION_ERROR".into()),
                message: Some("Property 'x' is non-unique".into()),
                ..Default::default()
            },
            "",
        );
        match err {
            Error::Validation { category, message } => {
                assert_eq!(category, "VALIDATION_ERROR");
                assert!(message.contains("non-unique"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
