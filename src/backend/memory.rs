//! in process alert store, used for development setups and tests
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AlertBackend, BackendError};
use crate::alert::AlertRecord;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemorySettings {
	/// reject alerts whose environment is not listed
	#[serde(default)]
	pub allowed_environments: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
	/// stored alerts in insertion order
	alerts: RwLock<Vec<AlertRecord>>,
	allowed_environments: Option<Vec<String>>,
}

impl MemoryBackend {
	pub fn new(settings: &MemorySettings) -> Self {
		Self { alerts: RwLock::default(), allowed_environments: settings.allowed_environments.clone() }
	}

	/// Constructs a backend that already holds `alerts`. Alerts without an id
	/// get one assigned.
	#[cfg(test)]
	pub fn with_alerts(alerts: impl IntoIterator<Item = AlertRecord>) -> Self {
		let alerts = alerts
			.into_iter()
			.map(|mut alert| {
				alert.id.get_or_insert_with(|| Uuid::new_v4().to_string());
				alert
			})
			.collect();

		Self { alerts: RwLock::new(alerts), allowed_environments: None }
	}

	/// snapshot of all stored alerts
	#[cfg(test)]
	pub async fn alerts(&self) -> Vec<AlertRecord> {
		self.alerts.read().await.clone()
	}

	fn check_policy(&self, alert: &AlertRecord) -> Result<(), BackendError> {
		match &self.allowed_environments {
			Some(allowed) if !allowed.contains(&alert.environment) => Err(BackendError::Rejected(
				format!("[POLICY] Alert environment does not match one of {}", allowed.join(", ")),
			)),
			_ => Ok(()),
		}
	}
}

#[async_trait::async_trait]
impl AlertBackend for MemoryBackend {
	async fn find_by_attribute(
		&self,
		key: &str,
		value: &str,
	) -> Result<Vec<AlertRecord>, BackendError> {
		let alerts = self.alerts.read().await;

		Ok(alerts.iter().filter(|alert| alert.attribute(key) == Some(value)).cloned().collect())
	}

	async fn process_alert(&self, mut alert: AlertRecord) -> Result<AlertRecord, BackendError> {
		self.check_policy(&alert)?;

		let now = Utc::now();
		alert.create_time.get_or_insert(now);
		alert.receive_time = Some(now);
		alert.status.get_or_insert_with(|| String::from("open"));

		let mut alerts = self.alerts.write().await;

		let stored = alert
			.id
			.as_ref()
			.and_then(|id| alerts.iter().position(|stored| stored.id.as_ref() == Some(id)));

		match stored {
			Some(index) => alerts[index] = alert.clone(),
			None => {
				alert.id.get_or_insert_with(|| Uuid::new_v4().to_string());
				alerts.push(alert.clone());
			}
		}

		tracing::trace!(id = ?alert.id, "stored alert");

		Ok(alert)
	}
}
