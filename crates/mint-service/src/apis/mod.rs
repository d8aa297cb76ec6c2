//! Request handlers for the mint API.

pub mod jobs;
pub mod mints;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use mint_core::{PipelineError, ReconstructedMint, UserOutcome};
use mint_dispatch::DispatchError;
use mint_submit::SubmissionError;
use serde::Serialize;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiError {
	#[serde(skip)]
	pub status: StatusCode,
	/// Which of the three failure outcomes this is; absent for plain request errors.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub outcome: Option<UserOutcome>,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fallback: Option<ReconstructedMint>,
}

impl ApiError {
	pub fn bad_request(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::BAD_REQUEST,
			outcome: None,
			message: message.into(),
			fallback: None,
		}
	}
}

impl From<PipelineError> for ApiError {
	fn from(err: PipelineError) -> Self {
		let outcome = err.user_outcome();
		let status = match (&err, outcome) {
			(PipelineError::Submission(SubmissionError::AlreadyInFlight(_)), _) => {
				StatusCode::CONFLICT
			},
			(_, UserOutcome::TransactionFailed) => StatusCode::UNPROCESSABLE_ENTITY,
			(_, UserOutcome::ConfirmationUncertain) => StatusCode::GATEWAY_TIMEOUT,
			(_, UserOutcome::SideEffectPending) => StatusCode::BAD_GATEWAY,
		};

		Self {
			status,
			outcome: Some(outcome),
			message: err.to_string(),
			fallback: err.fallback().cloned(),
		}
	}
}

impl From<DispatchError> for ApiError {
	fn from(err: DispatchError) -> Self {
		Self {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			outcome: None,
			message: err.to_string(),
			fallback: None,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(self)).into_response()
	}
}
