//! client for the alerta REST API
//!
//! See <https://docs.alerta.io/api/reference.html>
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use url::Url;

use super::{AlertBackend, BackendError};
use crate::alert::AlertRecord;

fn default_timeout() -> Duration {
	Duration::from_secs(10)
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct AlertaSettings {
	/// api root, e.g. `http://alerta:8080/api`
	pub endpoint: Url,
	#[serde(default)]
	pub api_key: Option<String>,
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	#[serde(default = "default_timeout")]
	pub timeout: Duration,
}

pub struct AlertaClient {
	client: Client,
	endpoint: String,
	api_key: Option<String>,
}

/// response body of `POST /alert`
#[derive(Debug, Deserialize)]
struct AlertResponse {
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	alert: Option<AlertRecord>,
}

/// response body of `GET /alerts`
#[derive(Debug, Deserialize)]
struct AlertsResponse {
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	alerts: Vec<AlertRecord>,
}

impl AlertaClient {
	pub fn new(settings: &AlertaSettings) -> Result<Self> {
		let client = Client::builder()
			.timeout(settings.timeout)
			.build()
			.context("failed to build http client")?;

		Ok(Self {
			client,
			endpoint: settings.endpoint.as_str().trim_end_matches('/').to_owned(),
			api_key: settings.api_key.clone(),
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}/{}", self.endpoint, path)
	}

	fn request(&self, method: Method, path: &str) -> RequestBuilder {
		let request = self.client.request(method, self.url(path));

		match &self.api_key {
			Some(key) => request.header(header::AUTHORIZATION, format!("Key {key}")),
			None => request,
		}
	}
}

/// Maps the response of `POST /alert` to the persisted alert or an error.
/// alerta answers `403` if a plugin rejected the alert.
fn process_response(status: StatusCode, body: &[u8]) -> Result<AlertRecord, BackendError> {
	let response = serde_json::from_slice::<AlertResponse>(body);

	if status.is_success() {
		return match response {
			Ok(AlertResponse { alert: Some(alert), .. }) => Ok(alert),
			Ok(_) => Err(BackendError::Failure(String::from("alerta response did not contain an alert"))),
			Err(err) => Err(BackendError::Failure(format!("invalid alerta response: {err}"))),
		};
	}

	let message = response
		.ok()
		.and_then(|response| response.message)
		.unwrap_or_else(|| format!("alerta responded with {status}"));

	match status {
		StatusCode::FORBIDDEN => Err(BackendError::Rejected(message)),
		_ => Err(BackendError::Failure(message)),
	}
}

fn find_response(status: StatusCode, body: &[u8]) -> Result<Vec<AlertRecord>, BackendError> {
	let response = serde_json::from_slice::<AlertsResponse>(body);

	match response {
		Ok(response) if status.is_success() => Ok(response.alerts),
		Ok(AlertsResponse { message: Some(message), .. }) => Err(BackendError::Failure(message)),
		Ok(_) => Err(BackendError::Failure(format!("alerta responded with {status}"))),
		Err(err) => Err(BackendError::Failure(format!("invalid alerta response: {err}"))),
	}
}

fn transport_error(err: reqwest::Error) -> BackendError {
	BackendError::Failure(format!("alerta request failed: {err}"))
}

#[async_trait::async_trait]
impl AlertBackend for AlertaClient {
	async fn find_by_attribute(
		&self,
		key: &str,
		value: &str,
	) -> Result<Vec<AlertRecord>, BackendError> {
		let response = self
			.request(Method::GET, "alerts")
			.query(&[(format!("attributes.{key}"), value)])
			.send()
			.await
			.map_err(transport_error)?;

		let status = response.status();
		let body = response.bytes().await.map_err(transport_error)?;

		find_response(status, &body)
	}

	async fn process_alert(&self, alert: AlertRecord) -> Result<AlertRecord, BackendError> {
		let response = self
			.request(Method::POST, "alert")
			.json(&alert)
			.send()
			.await
			.map_err(transport_error)?;

		let status = response.status();
		let body = response.bytes().await.map_err(transport_error)?;

		tracing::debug!(%status, resource = %alert.resource, event = %alert.event, "submitted alert to alerta");

		process_response(status, &body)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::{json, Value};

	use super::*;

	fn client(endpoint: &str) -> AlertaClient {
		AlertaClient::new(&AlertaSettings {
			endpoint: Url::parse(endpoint).unwrap(),
			api_key: Some("secret".to_owned()),
			timeout: default_timeout(),
		})
		.unwrap()
	}

	#[test]
	fn timeouts_keep_fractional_seconds() {
		let settings = |value: Value| -> AlertaSettings {
			serde_json::from_value(json!({"endpoint": "http://alerta:8080/api", "timeout": value})).unwrap()
		};

		assert_eq!(settings(json!(0.25)).timeout, Duration::from_millis(250));
		assert_eq!(settings(json!(30)).timeout, Duration::from_secs(30));

		let defaulted: AlertaSettings =
			serde_json::from_value(json!({"endpoint": "http://alerta:8080/api"})).unwrap();
		assert_eq!(defaulted.timeout, Duration::from_secs(10));
	}

	#[test]
	fn urls_keep_the_api_prefix() {
		assert_eq!(client("http://alerta:8080/api").url("alert"), "http://alerta:8080/api/alert");
		assert_eq!(client("http://alerta:8080/api/").url("alerts"), "http://alerta:8080/api/alerts");
	}

	#[test]
	fn requests_carry_the_api_key() {
		let request = client("http://alerta:8080/api").request(Method::GET, "alerts").build().unwrap();

		assert_eq!(request.headers()[header::AUTHORIZATION], "Key secret");
	}

	#[test]
	fn created_alert_is_returned() {
		let body = json!({
			"status": "ok",
			"id": "abc",
			"alert": {"id": "abc", "resource": "cpu", "event": "High CPU", "status": "open"}
		});

		let alert = process_response(StatusCode::CREATED, body.to_string().as_bytes()).unwrap();

		assert_eq!(alert.id.as_deref(), Some("abc"));
	}

	#[test]
	fn forbidden_is_a_rejection() {
		let body = json!({"status": "error", "message": "[POLICY] Alert environment does not match"});

		let err = process_response(StatusCode::FORBIDDEN, body.to_string().as_bytes()).unwrap_err();

		assert_eq!(err, BackendError::Rejected("[POLICY] Alert environment does not match".to_owned()));
	}

	#[test]
	fn other_errors_are_failures() {
		let err = process_response(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>").unwrap_err();

		assert_eq!(err, BackendError::Failure("alerta responded with 502 Bad Gateway".to_owned()));
	}

	#[test]
	fn find_reads_alerts_array() {
		let body = json!({
			"status": "ok",
			"total": 1,
			"alerts": [{"id": "abc", "resource": "cpu", "event": "High CPU", "attributes": {"ruleId": "42"}}]
		});

		let alerts = find_response(StatusCode::OK, body.to_string().as_bytes()).unwrap();

		assert_eq!(alerts.len(), 1);
		assert_eq!(alerts[0].attribute("ruleId"), Some("42"));
	}

	#[test]
	fn find_surfaces_error_message() {
		let body = json!({"status": "error", "message": "database down"});

		let err = find_response(StatusCode::INTERNAL_SERVER_ERROR, body.to_string().as_bytes()).unwrap_err();

		assert_eq!(err, BackendError::Failure("database down".to_owned()));
	}
}
