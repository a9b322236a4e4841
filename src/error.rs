//! Errors returned by the webhook receiver. They are serialized as JSON and
//! returned in the response body.
use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::{backend::BackendError, payload::PayloadError};

/// how far processing got before a backend error stopped it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
	/// ids of the alerts the backend accepted
	pub processed: Vec<String>,
	/// number of alerts that were never submitted
	pub skipped: usize,
}

impl Progress {
	fn is_empty(&self) -> bool {
		self.processed.is_empty() && self.skipped == 0
	}
}

#[derive(Error, Debug)]
pub enum WebhookError {
	#[error(transparent)]
	MalformedPayload(#[from] PayloadError),
	#[error("{message}")]
	BackendRejection { message: String, progress: Progress },
	#[error("{message}")]
	BackendFailure { message: String, progress: Progress },
}

impl WebhookError {
	/// classify an error of the alert backend
	pub fn backend(err: BackendError, progress: Progress) -> Self {
		match err {
			BackendError::Rejected(message) => Self::BackendRejection { message, progress },
			BackendError::Failure(message) => Self::BackendFailure { message, progress },
		}
	}

	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
			Self::BackendRejection { .. } => StatusCode::FORBIDDEN,
			Self::BackendFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn progress(&self) -> Option<&Progress> {
		match self {
			Self::MalformedPayload(_) => None,
			Self::BackendRejection { progress, .. } | Self::BackendFailure { progress, .. } => {
				Some(progress).filter(|progress| !progress.is_empty())
			}
		}
	}
}

#[derive(Serialize)]
struct ErrorBody<'a> {
	status: &'static str,
	message: String,
	#[serde(flatten)]
	progress: Option<&'a Progress>,
}

impl IntoResponse for WebhookError {
	fn into_response(self) -> Response {
		let body = ErrorBody { status: "error", message: self.to_string(), progress: self.progress() };

		(self.status_code(), Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::{json, Value};

	use super::*;

	async fn body_json(err: WebhookError) -> (StatusCode, Value) {
		let response = err.into_response();
		let status = response.status();
		let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

		(status, serde_json::from_slice(&body).unwrap())
	}

	#[tokio::test]
	async fn malformed_payload_is_bad_request() {
		let (status, body) = body_json(PayloadError::NoAlerts.into()).await;

		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body, json!({"status": "error", "message": "no alerts in Grafana notification payload"}));
	}

	#[tokio::test]
	async fn rejection_reports_progress() {
		let progress = Progress { processed: vec!["a".to_owned()], skipped: 2 };
		let err = WebhookError::backend(BackendError::Rejected("vetoed".to_owned()), progress);

		let (status, body) = body_json(err).await;

		assert_eq!(status, StatusCode::FORBIDDEN);
		assert_eq!(
			body,
			json!({"status": "error", "message": "vetoed", "processed": ["a"], "skipped": 2})
		);
	}

	#[tokio::test]
	async fn failure_without_progress_is_plain() {
		let err = WebhookError::backend(BackendError::Failure("down".to_owned()), Progress::default());

		let (status, body) = body_json(err).await;

		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(body, json!({"status": "error", "message": "down"}));
	}
}
