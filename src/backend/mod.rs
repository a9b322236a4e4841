//! The alert backend the normalized alerts are handed to.
//!
//! The adapter only needs two capabilities from the backend: looking up
//! existing alerts by attribute and submitting (new or updated) alerts. De-
//! duplication, correlation and the alert state machine all live behind
//! [AlertBackend::process_alert].

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::{
	alert::AlertRecord,
	error::{Progress, WebhookError},
};

pub mod alerta;
pub mod memory;

/// Error returned by an [AlertBackend]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
	/// the backend refused the alert (e.g. a policy plugin vetoed it)
	#[error("{0}")]
	Rejected(String),
	/// anything else, connectivity or internal errors
	#[error("{0}")]
	Failure(String),
}

#[async_trait]
pub trait AlertBackend: Send + Sync {
	/// all stored alerts with `attributes.<key> == value`
	async fn find_by_attribute(&self, key: &str, value: &str)
		-> Result<Vec<AlertRecord>, BackendError>;

	/// submit an alert, returns the alert as persisted by the backend
	async fn process_alert(&self, alert: AlertRecord) -> Result<AlertRecord, BackendError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendSettings {
	Memory(memory::MemorySettings),
	Alerta(alerta::AlertaSettings),
}

impl BackendSettings {
	/// construct the configured backend
	pub fn build(&self) -> Result<Arc<dyn AlertBackend>> {
		let backend: Arc<dyn AlertBackend> = match self {
			BackendSettings::Memory(settings) => Arc::new(memory::MemoryBackend::new(settings)),
			BackendSettings::Alerta(settings) => Arc::new(
				alerta::AlertaClient::new(settings).context("failed to construct alerta client")?,
			),
		};

		Ok(backend)
	}
}

/// Submits alerts one after another in order.
///
/// Stops at the first failing alert, the returned error reports the ids of the
/// alerts already processed and the number of alerts that were skipped.
pub async fn submit_all(
	backend: &dyn AlertBackend,
	alerts: Vec<AlertRecord>,
) -> Result<Vec<AlertRecord>, WebhookError> {
	let total = alerts.len();
	let mut processed = Vec::with_capacity(total);

	for alert in alerts {
		match backend.process_alert(alert).await {
			Ok(alert) => processed.push(alert),
			Err(err) => {
				let progress = Progress {
					processed: processed.iter().filter_map(|alert| alert.id.clone()).collect(),
					skipped: total - processed.len() - 1,
				};

				return Err(WebhookError::backend(err, progress));
			}
		}
	}

	Ok(processed)
}
