//! data structures for deserializing incoming grafana notifications
//!
//! See the legacy alerting webhook notifier:
//! <https://grafana.com/docs/grafana/v7.5/alerting/notifications/#webhook>
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::tags::TagMap;

/// Error occuring when a notification can't be turned into alerts
#[derive(Error, Debug)]
pub enum PayloadError {
	#[error("failed to parse notification payload: {0}")]
	InvalidJson(#[from] serde_json::Error),
	#[error("notification payload is not a json object")]
	NotAnObject,
	#[error("notification payload is missing required key `{0}`")]
	MissingField(&'static str),
	#[error("no alerts in Grafana notification payload")]
	NoAlerts,
}

/// state of the grafana rule that triggered the notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
	Alerting,
	Ok,
	/// `no_data`, `paused`, `pending` and whatever else grafana sends
	Other(String),
}

impl State {
	pub fn as_str(&self) -> &str {
		match self {
			State::Alerting => "alerting",
			State::Ok => "ok",
			State::Other(state) => state.as_str(),
		}
	}
}

impl From<String> for State {
	fn from(state: String) -> Self {
		match state.as_str() {
			"alerting" => State::Alerting,
			"ok" => State::Ok,
			_ => State::Other(state),
		}
	}
}

/// a grafana notification with its state and rule id checked
///
/// Everything else is only looked at by [Notification::details], since the
/// `ok` and `no_data` notifications are routed by state and rule id alone.
#[derive(Debug, Clone)]
pub struct Notification {
	pub state: State,
	/// string form of `ruleId`
	pub rule_id: Option<String>,
	/// the notification exactly as it was received
	raw: Value,
}

/// rule fields and evaluation matches of an alerting notification
#[derive(Debug, Clone)]
pub struct RuleDetails {
	pub rule_name: Option<String>,
	pub rule_url: Option<String>,
	pub image_url: Option<String>,
	pub message: Option<String>,
	pub title: Option<String>,
	/// the rule tags
	pub tags: TagMap,
	pub eval_matches: Vec<EvalMatch>,
}

/// one breached metric of a rule
#[derive(Debug, Clone, PartialEq)]
pub struct EvalMatch {
	pub metric: String,
	pub value: Value,
	pub tags: TagMap,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
struct RawNotification {
	state: Option<String>,
	rule_id: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::missing_docs_in_private_items)]
struct RawDetails {
	rule_name: Option<String>,
	rule_url: Option<String>,
	image_url: Option<String>,
	message: Option<String>,
	title: Option<String>,
	#[serde(default)]
	tags: TagMap,
	#[serde(default)]
	eval_matches: Option<Vec<RawEvalMatch>>,
}

#[derive(Deserialize)]
#[allow(clippy::missing_docs_in_private_items)]
struct RawEvalMatch {
	metric: Option<String>,
	/// `null` is a value, only a missing key is `None`
	#[serde(default, deserialize_with = "present")]
	value: Option<Value>,
	#[serde(default)]
	tags: TagMap,
}

impl Notification {
	/// Parses a notification body and checks its `state`.
	///
	/// The rest of the body is passed through untouched in [Notification::raw].
	///
	/// # Arguments
	///
	/// * `body` - the raw request body
	pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
		let raw: Value = serde_json::from_slice(body)?;
		Self::from_value(raw)
	}

	pub fn from_value(raw: Value) -> Result<Self, PayloadError> {
		if !raw.is_object() {
			return Err(PayloadError::NotAnObject);
		}

		let RawNotification { state, rule_id } = RawNotification::deserialize(&raw)?;

		let state = State::from(state.ok_or(PayloadError::MissingField("state"))?);

		Ok(Self { state, rule_id: rule_id.and_then(rule_id_string), raw })
	}

	/// Reads the rule fields and evaluation matches, every match needs a
	/// `metric` and a `value`.
	pub fn details(&self) -> Result<RuleDetails, PayloadError> {
		let RawDetails { rule_name, rule_url, image_url, message, title, tags, eval_matches } =
			RawDetails::deserialize(&self.raw)?;

		let eval_matches = eval_matches
			.unwrap_or_default()
			.into_iter()
			.map(|m| {
				Ok(EvalMatch {
					metric: m.metric.ok_or(PayloadError::MissingField("evalMatches.metric"))?,
					value: m.value.ok_or(PayloadError::MissingField("evalMatches.value"))?,
					tags: m.tags,
				})
			})
			.collect::<Result<Vec<_>, PayloadError>>()?;

		Ok(RuleDetails { rule_name, rule_url, image_url, message, title, tags, eval_matches })
	}

	/// the notification as it was received
	pub fn raw(&self) -> &Value {
		&self.raw
	}
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	Value::deserialize(deserializer).map(Some)
}

/// grafana sends numeric rule ids, alerta stores them as strings. `0` and the
/// empty string don't identify a rule
fn rule_id_string(rule_id: Value) -> Option<String> {
	match rule_id {
		Value::Null => None,
		Value::Number(id) if id.as_f64() == Some(0.0) => None,
		Value::String(id) if id.is_empty() => None,
		Value::String(id) => Some(id),
		other => Some(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn parses_alerting_notification() {
		let body = json!({
			"state": "alerting",
			"ruleId": 7,
			"ruleName": "High CPU",
			"tags": {"team": "infra"},
			"evalMatches": [{"metric": "cpu", "value": 97.5, "tags": {"host": "web-1"}}],
			"dashboardId": 3
		});

		let notification = Notification::parse(body.to_string().as_bytes()).unwrap();
		let details = notification.details().unwrap();

		assert_eq!(notification.state, State::Alerting);
		assert_eq!(notification.rule_id.as_deref(), Some("7"));
		assert_eq!(details.rule_name.as_deref(), Some("High CPU"));
		assert_eq!(details.tags.get("team"), Some("infra"));
		assert_eq!(details.eval_matches.len(), 1);
		assert_eq!(details.eval_matches[0].metric, "cpu");
		assert_eq!(details.eval_matches[0].tags.get("host"), Some("web-1"));
		assert_eq!(notification.raw(), &body);
	}

	#[test]
	fn missing_state_is_reported() {
		let err = Notification::from_value(json!({"ruleId": 1})).unwrap_err();

		assert!(matches!(err, PayloadError::MissingField("state")));
	}

	#[test]
	fn missing_match_metric_is_reported() {
		let notification = Notification::from_value(json!({
			"state": "alerting",
			"evalMatches": [{"value": 1}]
		}))
		.unwrap();

		assert!(matches!(notification.details(), Err(PayloadError::MissingField("evalMatches.metric"))));
	}

	#[test]
	fn null_match_value_is_kept() {
		let details = Notification::from_value(json!({
			"state": "alerting",
			"evalMatches": [{"metric": "cpu", "value": null}]
		}))
		.unwrap()
		.details()
		.unwrap();

		assert_eq!(details.eval_matches[0].value, Value::Null);
	}

	#[test]
	fn non_object_and_garbage_are_rejected() {
		assert!(matches!(Notification::parse(b"[1, 2]"), Err(PayloadError::NotAnObject)));
		assert!(matches!(Notification::parse(b"{not json"), Err(PayloadError::InvalidJson(_))));
	}

	#[test]
	fn unknown_states_are_kept() {
		let notification = Notification::from_value(json!({"state": "no_data"})).unwrap();

		assert_eq!(notification.state, State::Other("no_data".to_owned()));
		assert_eq!(notification.state.as_str(), "no_data");
		assert!(notification.details().unwrap().eval_matches.is_empty());
	}

	#[test]
	fn rule_fields_are_only_checked_on_demand() {
		let notification = Notification::from_value(json!({
			"state": "ok",
			"ruleId": 42,
			"message": 5,
			"tags": [1, 2],
			"evalMatches": [{"metric": "cpu"}]
		}))
		.unwrap();

		assert_eq!(notification.state, State::Ok);
		assert_eq!(notification.rule_id.as_deref(), Some("42"));
		assert!(matches!(notification.details(), Err(PayloadError::InvalidJson(_))));
	}

	#[test]
	fn string_and_empty_rule_ids() {
		let named = Notification::from_value(json!({"state": "ok", "ruleId": "abc"})).unwrap();
		let empty = Notification::from_value(json!({"state": "ok", "ruleId": ""})).unwrap();

		assert_eq!(named.rule_id.as_deref(), Some("abc"));
		assert_eq!(empty.rule_id, None);
	}

	#[test]
	fn zero_rule_id_is_no_rule_id() {
		for rule_id in [json!(0), json!(0.0), json!(null)] {
			let notification = Notification::from_value(json!({"state": "ok", "ruleId": rule_id})).unwrap();
			assert_eq!(notification.rule_id, None, "{rule_id}");
		}

		let numbered = Notification::from_value(json!({"state": "ok", "ruleId": 10})).unwrap();
		assert_eq!(numbered.rule_id.as_deref(), Some("10"));
	}
}
