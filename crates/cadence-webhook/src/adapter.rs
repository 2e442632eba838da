// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP delivery through a webhook endpoint.

use std::time::Duration;

use async_trait::async_trait;
use cadence_config::model::PlatformConfig;
use cadence_core::{
    AdapterType, CadenceError, DeliveryError, DeliveryReceipt, DeliveryRequest, HealthStatus,
    PlatformAdapter, PluginAdapter, TargetPlatform,
};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, warn};

/// JSON body sent to the endpoint.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    item_id: &'a str,
    channel_id: &'a str,
    payload_ref: &'a str,
    attempt_number: u32,
}

/// Platform adapter that delivers over HTTP.
#[derive(Debug, Clone)]
pub struct WebhookPlatform {
    client: reqwest::Client,
    target: TargetPlatform,
    url: String,
    health_url: Option<String>,
    external_id_field: String,
}

impl WebhookPlatform {
    pub fn new(config: &PlatformConfig, timeout: Duration) -> Result<Self, CadenceError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                CadenceError::Config(format!("invalid auth token for {}: {e}", config.platform))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CadenceError::Platform {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            target: config.platform,
            url: config.url.clone(),
            health_url: config.health_url.clone(),
            external_id_field: config.external_id_field.clone(),
        })
    }

    fn external_id(&self, body: &serde_json::Value) -> Option<String> {
        match body.get(&self.external_id_field)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Map a non-success status to a delivery error.
fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
    let detail = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            DeliveryError::transient(detail)
        }
        s if s.is_server_error() => DeliveryError::transient(detail),
        _ => DeliveryError::permanent(detail),
    }
}

/// Map a transport failure to a delivery error.
fn classify_transport(err: &reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::transient(format!("request timed out: {err}"))
    } else if err.is_connect() {
        DeliveryError::channel_down(format!("connection failed: {err}"))
    } else {
        DeliveryError::transient(format!("request failed: {err}"))
    }
}

#[async_trait]
impl PluginAdapter for WebhookPlatform {
    fn name(&self) -> &str {
        "webhook"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        let Some(url) = &self.health_url else {
            return Ok(HealthStatus::Healthy);
        };
        let status = match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) if response.status().is_server_error() => {
                HealthStatus::Unhealthy(format!("health endpoint returned {}", response.status()))
            }
            Ok(response) => {
                HealthStatus::Degraded(format!("health endpoint returned {}", response.status()))
            }
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        Ok(status)
    }

    async fn shutdown(&self) -> Result<(), CadenceError> {
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for WebhookPlatform {
    fn target(&self) -> TargetPlatform {
        self.target
    }

    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError> {
        let envelope = Envelope {
            item_id: &request.item_id,
            channel_id: &request.channel_id,
            payload_ref: &request.payload_ref,
            attempt_number: request.attempt_number,
        };
        let response = self
            .client
            .post(&self.url)
            .header("idempotency-key", &request.item_id)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        debug!(target = %self.target, item_id = %request.item_id, %status, "webhook response");
        let body = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        // Accepted by the platform: anything below is permanent, never retried.
        let json: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            DeliveryError::permanent(format!(
                "delivered (HTTP {status}), id missing: unparseable response body: {e}"
            ))
        })?;
        let external_id = self.external_id(&json).ok_or_else(|| {
            warn!(
                target = %self.target,
                item_id = %request.item_id,
                field = %self.external_id_field,
                "delivered without external id"
            );
            DeliveryError::permanent(format!(
                "delivered (HTTP {status}), id missing: response has no `{}` field",
                self.external_id_field
            ))
        })?;
        Ok(DeliveryReceipt { external_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::DeliveryErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> PlatformConfig {
        PlatformConfig {
            platform: TargetPlatform::SocialPost,
            url: format!("{}/publish", server.uri()),
            health_url: Some(format!("{}/health", server.uri())),
            auth_token: Some("s3cret".into()),
            external_id_field: "id".into(),
        }
    }

    fn platform(server: &MockServer) -> WebhookPlatform {
        WebhookPlatform::new(&config(server), Duration::from_secs(5)).unwrap()
    }

    fn request() -> DeliveryRequest {
        DeliveryRequest {
            item_id: "item-1".into(),
            channel_id: "weekly".into(),
            payload_ref: "content://weekly/1".into(),
            attempt_number: 2,
        }
    }

    async fn respond(status: u16) -> DeliveryError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
        platform(&server).deliver(&request()).await.unwrap_err()
    }

    #[tokio::test]
    async fn success_returns_external_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish"))
            .and(header("authorization", "Bearer s3cret"))
            .and(header("idempotency-key", "item-1"))
            .and(body_partial_json(serde_json::json!({
                "payload_ref": "content://weekly/1",
                "attempt_number": 2
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "post-42"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = platform(&server).deliver(&request()).await.unwrap();
        assert_eq!(receipt.external_id, "post-42");
    }

    #[tokio::test]
    async fn numeric_external_id_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 991})))
            .mount(&server)
            .await;
        let receipt = platform(&server).deliver(&request()).await.unwrap();
        assert_eq!(receipt.external_id, "991");
    }

    #[tokio::test]
    async fn missing_external_id_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;
        let err = platform(&server).deliver(&request()).await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Permanent);
        assert!(err.detail.starts_with("delivered (HTTP 200 OK), id missing"), "{}", err.detail);
        assert!(err.detail.contains("`id`"), "{}", err.detail);
    }

    #[tokio::test]
    async fn non_json_success_body_reports_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&server)
            .await;
        let err = platform(&server).deliver(&request()).await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Permanent);
        assert!(err.detail.contains("id missing"), "{}", err.detail);
        assert!(!respond(400).await.detail.contains("delivered"));
    }

    #[tokio::test]
    async fn rate_limit_and_server_errors_are_transient() {
        for status in [429, 408, 500, 503] {
            assert_eq!(respond(status).await.kind, DeliveryErrorKind::Transient, "{status}");
        }
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        for status in [400, 401, 403, 422] {
            let err = respond(status).await;
            assert_eq!(err.kind, DeliveryErrorKind::Permanent, "{status}");
            assert!(err.detail.contains("nope"));
        }
    }

    #[tokio::test]
    async fn refused_connection_is_channel_down() {
        let server = MockServer::start().await;
        let cfg = config(&server);
        drop(server);
        let platform = WebhookPlatform::new(&cfg, Duration::from_secs(2)).unwrap();
        let err = platform.deliver(&request()).await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::ChannelDown);
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(serde_json::json!({"id": "late"})),
            )
            .mount(&server)
            .await;
        let platform = WebhookPlatform::new(&config(&server), Duration::from_millis(300)).unwrap();
        let err = platform.deliver(&request()).await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Transient);
    }

    #[tokio::test]
    async fn health_check_follows_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let platform = platform(&server);
        assert!(!platform.health_check().await.unwrap().is_available());
        assert_eq!(platform.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn no_health_url_is_healthy() {
        let server = MockServer::start().await;
        let mut cfg = config(&server);
        cfg.health_url = None;
        let platform = WebhookPlatform::new(&cfg, Duration::from_secs(1)).unwrap();
        assert_eq!(platform.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
