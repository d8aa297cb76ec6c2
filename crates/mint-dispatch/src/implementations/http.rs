//! HTTP webhook client for `POST {url}/snapshot-minted`.

use crate::{WebhookError, WebhookInterface};
use async_trait::async_trait;
use mint_config::WebhookConfig;
use mint_types::WebhookResponse;
use std::time::Duration;

pub struct HttpWebhook {
	client: reqwest::Client,
	endpoint: String,
}

impl HttpWebhook {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, WebhookError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| WebhookError::Network(e.to_string()))?;

		Ok(Self {
			client,
			endpoint: format!("{}/snapshot-minted", base_url.trim_end_matches('/')),
		})
	}

	pub fn from_config(config: &WebhookConfig) -> Result<Self, WebhookError> {
		Self::new(
			&config.url,
			Duration::from_secs(config.request_timeout_seconds),
		)
	}
}

#[async_trait]
impl WebhookInterface for HttpWebhook {
	async fn deliver(&self, payload: &serde_json::Value) -> Result<WebhookResponse, WebhookError> {
		let response = self
			.client
			.post(&self.endpoint)
			.json(payload)
			.send()
			.await
			.map_err(|e| WebhookError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(WebhookError::Status(status.as_u16()));
		}

		let body: WebhookResponse = response
			.json()
			.await
			.map_err(|e| WebhookError::InvalidResponse(e.to_string()))?;
		if !body.success {
			return Err(WebhookError::Rejected);
		}
		Ok(body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{http::StatusCode, response::IntoResponse, routing::post, Json, Router};
	use serde_json::{json, Value};

	async fn handler(Json(body): Json<Value>) -> axum::response::Response {
		match body["processId"].as_str() {
			Some("ok") => Json(json!({
				"success": true,
				"data": { "imageUrl": "https://cdn.example/1.png", "beneficiaryCode": "B1", "rank": 3 }
			}))
			.into_response(),
			Some("declined") => Json(json!({ "success": false })).into_response(),
			Some("garbled") => "not json".into_response(),
			_ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
		}
	}

	async fn serve() -> String {
		let app = Router::new().route("/snapshot-minted", post(handler));
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}/", addr)
	}

	#[tokio::test]
	async fn test_successful_delivery() {
		let webhook = HttpWebhook::new(&serve().await, Duration::from_secs(5)).unwrap();

		let response = webhook.deliver(&json!({ "processId": "ok" })).await.unwrap();
		let data = response.data.unwrap();
		assert_eq!(data.image_url.as_deref(), Some("https://cdn.example/1.png"));
		assert_eq!(data.beneficiary_code.as_deref(), Some("B1"));
		assert_eq!(data.extra.get("rank"), Some(&json!(3)));
	}

	#[tokio::test]
	async fn test_failures_are_errors() {
		let webhook = HttpWebhook::new(&serve().await, Duration::from_secs(5)).unwrap();

		assert!(matches!(
			webhook.deliver(&json!({ "processId": "boom" })).await,
			Err(WebhookError::Status(500))
		));
		assert!(matches!(
			webhook.deliver(&json!({ "processId": "declined" })).await,
			Err(WebhookError::Rejected)
		));
		assert!(matches!(
			webhook.deliver(&json!({ "processId": "garbled" })).await,
			Err(WebhookError::InvalidResponse(_))
		));
	}
}
