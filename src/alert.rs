//! the normalized alert record handed to the alert backend
//!
//! Field names follow the alerta REST API so records can be posted as they
//! are and alerts returned by alerta deserialize back into the same type.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
pub struct AlertRecord {
	/// assigned by the backend
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub resource: String,
	pub event: String,
	#[serde(default, deserialize_with = "nullable")]
	pub environment: String,
	#[serde(default, deserialize_with = "nullable")]
	pub severity: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<String>,
	#[serde(default, deserialize_with = "nullable")]
	pub service: Vec<String>,
	#[serde(default, deserialize_with = "nullable")]
	pub group: String,
	#[serde(default, deserialize_with = "nullable")]
	pub value: String,
	#[serde(default, deserialize_with = "nullable")]
	pub text: String,
	#[serde(default, deserialize_with = "nullable")]
	pub tags: Vec<String>,
	#[serde(default, deserialize_with = "nullable")]
	pub attributes: IndexMap<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer: Option<String>,
	#[serde(default, deserialize_with = "nullable")]
	pub origin: String,
	#[serde(rename = "type", default, deserialize_with = "nullable")]
	pub event_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timeout: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub raw_data: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub create_time: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub receive_time: Option<DateTime<Utc>>,
}

impl AlertRecord {
	/// string value of an attribute
	pub fn attribute(&self, key: &str) -> Option<&str> {
		self.attributes.get(key).and_then(Value::as_str)
	}
}

/// alerta sends `null` for unset fields
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
