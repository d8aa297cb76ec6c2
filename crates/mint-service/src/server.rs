//! HTTP server for the mint API.

use crate::apis::{
	self,
	mints::{FinalizeRequest, MintRequest},
	ApiError,
};
use axum::{
	extract::{Path, State},
	response::Json,
	routing::{get, post},
	Router,
};
use mint_config::ApiConfig;
use mint_core::{MintOutcome, MintPipeline};
use mint_dispatch::JobView;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
	pub pipeline: Arc<MintPipeline>,
}

pub fn router(pipeline: Arc<MintPipeline>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/mints", post(handle_mint))
				.route("/mints/finalize", post(handle_finalize))
				.route("/jobs/{process_id}", get(handle_get_job)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(AppState { pipeline })
}

pub async fn start_server(
	api_config: ApiConfig,
	pipeline: Arc<MintPipeline>,
) -> Result<(), Box<dyn std::error::Error>> {
	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Mint API server starting on {}", bind_address);

	axum::serve(listener, router(pipeline)).await?;

	Ok(())
}

/// Handles POST /api/mints.
///
/// Runs the whole pipeline and answers once the webhook has reached a
/// terminal outcome, which can take minutes.
async fn handle_mint(
	State(state): State<AppState>,
	Json(request): Json<MintRequest>,
) -> Result<Json<MintOutcome>, ApiError> {
	match apis::mints::run_mint(&state.pipeline, request).await {
		Ok(outcome) => Ok(Json(outcome)),
		Err(e) => {
			tracing::warn!("Mint request failed: {}", e.message);
			Err(e)
		},
	}
}

/// Handles POST /api/mints/finalize.
async fn handle_finalize(
	State(state): State<AppState>,
	Json(request): Json<FinalizeRequest>,
) -> Result<Json<MintOutcome>, ApiError> {
	match apis::mints::finalize_mint(&state.pipeline, request).await {
		Ok(outcome) => Ok(Json(outcome)),
		Err(e) => {
			tracing::warn!("Finalize request failed: {}", e.message);
			Err(e)
		},
	}
}

/// Handles GET /api/jobs/{process_id}.
async fn handle_get_job(
	Path(process_id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<JobView>, ApiError> {
	apis::jobs::get_job(&state.pipeline, &process_id)
		.await
		.map(Json)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::{Request, StatusCode};
	use mint_config::Config;
	use mint_core::PipelineBuilder;
	use mint_types::{DispatchRecord, StorageKey, TerminalOutcome, WebhookJob};
	use serde_json::{json, Value};
	use std::str::FromStr;
	use tower::ServiceExt;

	const CONFIG: &str = r#"
[pipeline]
id = "api-test"
display_url_template = "https://cdn.example/{seed_id}.png"

[storage]
primary = "memory"
[storage.implementations.memory]

[submitter]
chain_id = 8453
[submitter.external]
bridge_url = "http://127.0.0.1:1"

[status]
[status.primary]
base_url = "http://127.0.0.1:1"
api_key = "key"
chain = "base"

[webhook]
url = "http://127.0.0.1:1"
"#;

	fn pipeline() -> Arc<MintPipeline> {
		let config = Config::from_str(CONFIG).unwrap();
		let factories = mint_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect();
		Arc::new(
			PipelineBuilder::new(config)
				.build::<mint_storage::StorageFactory>(factories)
				.unwrap(),
		)
	}

	async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
		let response = app
			.oneshot(Request::get(uri).body(Body::empty()).unwrap())
			.await
			.unwrap();
		let status = response.status();
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, serde_json::from_slice(&body).unwrap())
	}

	#[tokio::test]
	async fn test_job_lookup_reports_each_state() {
		let pipeline = pipeline();
		let storage = pipeline.storage().clone();
		storage
			.store(
				StorageKey::WebhookRetry.as_str(),
				"pending-1",
				&WebhookJob::new("pending-1", json!({ "processId": "pending-1" }), 0),
			)
			.await
			.unwrap();
		storage
			.store(
				StorageKey::WebhookOutcome.as_str(),
				"done-1",
				&DispatchRecord {
					process_id: "done-1".into(),
					outcome: TerminalOutcome::Exhausted { attempts: 18 },
					recorded_at: 0,
				},
			)
			.await
			.unwrap();

		let app = router(pipeline);

		let (status, body) = get(app.clone(), "/api/jobs/missing").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["state"], "not_found");

		let (_, body) = get(app.clone(), "/api/jobs/pending-1").await;
		assert_eq!(body["state"], "pending");
		assert_eq!(body["in_flight"], false);

		let (_, body) = get(app, "/api/jobs/done-1").await;
		assert_eq!(body["state"], "completed");
	}

	#[tokio::test]
	async fn test_finalize_rejects_empty_process_id() {
		let app = router(pipeline());
		let body = json!({
			"txHash": format!("0x{}", "ab".repeat(32)),
			"mint": {
				"processId": "",
				"contractAddress": "0x01",
				"seedId": "s",
				"snapshotId": "n",
				"beneficiaryCode": "B",
				"creator": "0x02"
			}
		});

		let response = app
			.oneshot(
				Request::post("/api/mints/finalize")
					.header("content-type", "application/json")
					.body(Body::from(body.to_string()))
					.unwrap(),
			)
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}
}
