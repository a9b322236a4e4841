use std::{
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
	body::Bytes,
	extract::{ConnectInfo, Extension},
	http::{header, HeaderMap, StatusCode, Uri},
	response::{IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{
	alert::AlertRecord,
	backend::{self, AlertBackend},
	defaults::RequestDefaults,
	error::WebhookError,
	mapper::{GrafanaWebhook, Mapped, Webhook},
	settings::Settings,
};

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookReceiverSettings {
	pub bind_address: IpAddr,
	pub port: u16,
	/// public url of the alerta api, used for the `href` of created alerts
	pub base_url: Url,
}

impl WebhookReceiverSettings {
	pub fn global() -> &'static Self {
		&Settings::global().webhook_receiver
	}

	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

pub struct State {
	webhook: GrafanaWebhook,
	backend: Arc<dyn AlertBackend>,
	base_url: Url,
}

impl State {
	pub fn new(webhook: GrafanaWebhook, backend: Arc<dyn AlertBackend>, base_url: Url) -> Self {
		Self { webhook, backend, base_url }
	}

	fn alert_href(&self, id: &str) -> String {
		format!("{}/alert/{}", self.base_url.as_str().trim_end_matches('/'), id)
	}
}

/// body of a single created alert
#[derive(Serialize)]
struct Created<'a> {
	status: &'static str,
	id: &'a str,
	alert: AlertBody<'a>,
}

#[derive(Serialize)]
struct AlertBody<'a> {
	#[serde(flatten)]
	alert: &'a AlertRecord,
	href: &'a str,
}

/// body of batch results
#[derive(Serialize)]
struct Processed<'a> {
	status: &'static str,
	ids: Vec<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	alerts: Option<&'a [AlertRecord]>,
}

impl<'a> Processed<'a> {
	fn new(alerts: &'a [AlertRecord]) -> Self {
		Self { status: "ok", ids: alerts.iter().filter_map(|a| a.id.as_deref()).collect(), alerts: None }
	}
}

/// address of the client that sent the notification, proxies are trusted
fn remote_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
	headers
		.get("x-forwarded-for")
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.split(',').next())
		.map(|ip| ip.trim().to_owned())
		.filter(|ip| !ip.is_empty())
		.or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

async fn grafana_receiver(
	Extension(state): Extension<Arc<State>>,
	uri: Uri,
	headers: HeaderMap,
	connect_info: Option<ConnectInfo<SocketAddr>>,
	body: Bytes,
) -> Result<Response, WebhookError> {
	let defaults = RequestDefaults::from_query(uri.query().unwrap_or_default());

	let mapped = state.webhook.incoming(&defaults, &body).map_err(|err| {
		tracing::debug!("rejected grafana notification: {err}");
		err
	})?;

	match mapped {
		Mapped::Alerts(mut alerts) => {
			tracing::debug!(count = alerts.len(), ?defaults, "received grafana alerts");

			if let Some(ip) = remote_ip(&headers, connect_info.as_ref()) {
				for alert in alerts.iter_mut() {
					alert.attributes.insert(String::from("ip"), Value::String(ip.clone()));
				}
			}

			let alerts = log_failure(backend::submit_all(state.backend.as_ref(), alerts).await)?;

			match alerts.as_slice() {
				[alert] => {
					let id = alert.id.as_deref().unwrap_or_default();
					let href = state.alert_href(id);
					let body = Created { status: "ok", id, alert: AlertBody { alert, href: &href } };

					Ok((StatusCode::CREATED, [(header::LOCATION, href.clone())], Json(body))
						.into_response())
				}
				alerts => Ok((StatusCode::CREATED, Json(Processed::new(alerts))).into_response()),
			}
		}
		Mapped::Resolve(request) => {
			let normal_severity = &state.webhook.settings().normal_severity;
			let alerts = log_failure(request.execute(state.backend.as_ref(), normal_severity).await)?;

			tracing::info!(rule_id = %request.rule_id, count = alerts.len(), "closed alerts of grafana rule");

			let body = Processed { alerts: Some(&alerts), ..Processed::new(&alerts) };
			Ok((StatusCode::OK, Json(body)).into_response())
		}
	}
}

/// log backend errors before they're turned into a response
fn log_failure(result: Result<Vec<AlertRecord>, WebhookError>) -> Result<Vec<AlertRecord>, WebhookError> {
	if let Err(err) = &result {
		match err {
			WebhookError::BackendRejection { .. } => tracing::warn!("alert backend rejected alert: {err}"),
			_ => tracing::error!("failed processing grafana alerts: {err}"),
		}
	}

	result
}

async fn health() -> &'static str {
	"OK"
}

pub fn router(state: Arc<State>) -> Router {
	Router::new()
		.route("/webhooks/grafana", post(grafana_receiver))
		.route("/health", get(health))
		.layer(Extension(state))
}

pub async fn run_webhook_receiver(state: State) -> Result<()> {
	let addr = WebhookReceiverSettings::global().to_socket_addr();
	let app = router(Arc::new(state));

	tracing::info!(%addr, "listening for grafana notifications");

	axum::Server::bind(&addr)
		.serve(app.into_make_service_with_connect_info::<SocketAddr>())
		.await
		.context("grafana webhook endpoint crashed")?;

	Ok(())
}
