//! Maps grafana notifications to normalized alerts.
//!
//! An `alerting` notification becomes one alert per evaluation match. An `ok`
//! notification closes all existing alerts that were raised by the same rule.
//!
//! Alert fields are resolved from three layers, later layers override earlier
//! ones:
//! 1. query parameters of the webhook url (or fixed fallbacks)
//! 2. the tags of the evaluation match
//! 3. the tags of the rule
//!
//! `service` is the exception, values of all layers are appended.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::{
	alert::AlertRecord,
	backend::{self, AlertBackend},
	defaults::RequestDefaults,
	error::{Progress, WebhookError},
	payload::{EvalMatch, Notification, PayloadError, RuleDetails, State},
	tags::ReservedTags,
};

pub const EVENT_TYPE: &str = "grafanaAlert";
pub const DEFAULT_SEVERITY: &str = "major";
pub const INDETERMINATE_SEVERITY: &str = "indeterminate";
pub const DEFAULT_SERVICE: &str = "Grafana";
pub const DEFAULT_GROUP: &str = "Performance";
pub const DEFAULT_ORIGIN: &str = "Grafana";
pub const CLOSED_STATUS: &str = "closed";

/// attribute used to correlate alerts with the grafana rule that raised them
pub const RULE_ID_ATTRIBUTE: &str = "ruleId";

fn default_environment() -> String {
	String::from("Production")
}

fn default_normal_severity() -> String {
	String::from("normal")
}

fn enabled() -> bool {
	true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MapperSettings {
	#[serde(default = "default_environment")]
	pub default_environment: String,
	/// surface leftover tags as alert attributes
	#[serde(default = "enabled")]
	pub tags_as_attributes: bool,
	/// surface leftover tags as `key=value` alert tags
	#[serde(default)]
	pub tags_as_tags: bool,
	/// severity of the backend's alarm model that means "resolved"
	#[serde(default = "default_normal_severity")]
	pub normal_severity: String,
}

impl Default for MapperSettings {
	fn default() -> Self {
		Self {
			default_environment: default_environment(),
			tags_as_attributes: true,
			tags_as_tags: false,
			normal_severity: default_normal_severity(),
		}
	}
}

/// the result of mapping a notification
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
	/// new alerts to submit, one per evaluation match
	Alerts(Vec<AlertRecord>),
	/// existing alerts of a rule have to be closed
	Resolve(ResolveRequest),
}

/// Request to close every alert raised by a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
	/// string form of the grafana `ruleId`
	pub rule_id: String,
}

impl ResolveRequest {
	/// Looks up the alerts of the rule, resets their severity to
	/// `normal_severity`, closes them and submits the updates in order.
	///
	/// Stops at the first alert the backend doesn't accept, see
	/// [backend::submit_all].
	pub async fn execute(
		&self,
		backend: &dyn AlertBackend,
		normal_severity: &str,
	) -> Result<Vec<AlertRecord>, WebhookError> {
		let existing = backend
			.find_by_attribute(RULE_ID_ATTRIBUTE, &self.rule_id)
			.await
			.map_err(|err| WebhookError::BackendFailure {
				message: err.to_string(),
				progress: Progress::default(),
			})?;

		tracing::debug!(rule_id = %self.rule_id, count = existing.len(), "closing alerts of rule");

		let updates = existing
			.into_iter()
			.map(|mut alert| {
				alert.severity = normal_severity.to_owned();
				alert.status = Some(CLOSED_STATUS.to_owned());
				alert
			})
			.collect();

		backend::submit_all(backend, updates).await
	}
}

/// a vendor specific webhook translating payloads into alerts
pub trait Webhook {
	/// # Arguments
	///
	/// * `defaults` - query parameters of the request
	///
	/// * `payload` - the raw request body
	fn incoming(&self, defaults: &RequestDefaults, payload: &[u8]) -> Result<Mapped, PayloadError>;
}

/// alert fields resolved from defaults and tags
#[derive(Debug)]
struct Fields {
	environment: String,
	severity: String,
	service: Vec<String>,
	group: String,
	customer: Option<String>,
	origin: String,
}

impl Fields {
	fn new(defaults: &RequestDefaults, settings: &MapperSettings) -> Self {
		let service = if defaults.service.is_empty() {
			vec![DEFAULT_SERVICE.to_owned()]
		} else {
			defaults.service.clone()
		};

		Self {
			environment: defaults
				.environment
				.clone()
				.unwrap_or_else(|| settings.default_environment.clone()),
			severity: defaults.severity.clone().unwrap_or_else(|| DEFAULT_SEVERITY.to_owned()),
			service,
			group: defaults.group.clone().unwrap_or_else(|| DEFAULT_GROUP.to_owned()),
			customer: defaults.customer.clone(),
			origin: defaults.origin.clone().unwrap_or_else(|| DEFAULT_ORIGIN.to_owned()),
		}
	}

	/// override fields with the values of a tag layer
	fn layer(&mut self, tags: ReservedTags) {
		let ReservedTags { environment, severity, service, group, customer, origin } = tags;

		if let Some(environment) = environment {
			self.environment = environment;
		}
		if let Some(severity) = severity {
			self.severity = severity;
		}
		if let Some(service) = service {
			self.service.push(service);
		}
		if let Some(group) = group {
			self.group = group;
		}
		if let Some(customer) = customer {
			self.customer = Some(customer);
		}
		if let Some(origin) = origin {
			self.origin = origin;
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct GrafanaWebhook {
	settings: MapperSettings,
}

impl GrafanaWebhook {
	pub fn new(settings: MapperSettings) -> Self {
		Self { settings }
	}

	pub fn settings(&self) -> &MapperSettings {
		&self.settings
	}

	/// Maps a parsed notification.
	///
	/// # Arguments
	///
	/// * `defaults` - query parameters of the request
	///
	/// * `notification` - the parsed notification
	pub fn map(
		&self,
		defaults: &RequestDefaults,
		notification: &Notification,
	) -> Result<Mapped, PayloadError> {
		match (&notification.state, &notification.rule_id) {
			(State::Alerting, rule_id) => {
				let details = notification.details()?;
				if details.eval_matches.is_empty() {
					return Ok(Mapped::Alerts(Vec::new()));
				}

				let rule = Rule {
					name: details.rule_name.as_deref().ok_or(PayloadError::MissingField("ruleName"))?,
					id: rule_id.as_deref().ok_or(PayloadError::MissingField("ruleId"))?,
					raw_data: serde_json::to_string(notification.raw())?,
				};

				let alerts = details
					.eval_matches
					.iter()
					.map(|eval_match| {
						self.parse_match(defaults, &notification.state, &details, &rule, eval_match)
					})
					.collect();

				Ok(Mapped::Alerts(alerts))
			}
			(State::Ok, Some(rule_id)) => {
				Ok(Mapped::Resolve(ResolveRequest { rule_id: rule_id.clone() }))
			}
			_ => Err(PayloadError::NoAlerts),
		}
	}

	fn severity(&self, state: &State, alerting_severity: String) -> String {
		match state {
			State::Alerting => alerting_severity,
			State::Ok => self.settings.normal_severity.clone(),
			State::Other(_) => INDETERMINATE_SEVERITY.to_owned(),
		}
	}

	fn parse_match(
		&self,
		defaults: &RequestDefaults,
		state: &State,
		details: &RuleDetails,
		rule: &Rule<'_>,
		eval_match: &EvalMatch,
	) -> AlertRecord {
		let mut fields = Fields::new(defaults, &self.settings);

		let (match_reserved, match_tags) = eval_match.tags.clone().take_reserved();
		let (rule_reserved, rule_tags) = details.tags.clone().take_reserved();
		fields.layer(match_reserved);
		fields.layer(rule_reserved);

		let mut attributes = IndexMap::new();
		let mut tags = Vec::new();

		if self.settings.tags_as_attributes {
			attributes.extend(match_tags.attributes());
			attributes.extend(rule_tags.attributes());
		}
		if self.settings.tags_as_tags {
			tags.extend(match_tags.tags());
			tags.extend(rule_tags.tags());
		}

		attributes.insert(RULE_ID_ATTRIBUTE.to_owned(), Value::String(rule.id.to_owned()));
		if let Some(url) = &details.rule_url {
			attributes.insert("ruleUrl".to_owned(), Value::String(link(url, "Rule")));
		}
		if let Some(url) = &details.image_url {
			attributes.insert("imageUrl".to_owned(), Value::String(link(url, "Image")));
		}

		let text = [&details.message, &details.title]
			.into_iter()
			.flatten()
			.find(|text| !text.is_empty())
			.cloned()
			.unwrap_or_else(|| state.as_str().to_owned());

		let Fields { environment, severity, service, group, customer, origin } = fields;

		AlertRecord {
			resource: eval_match.metric.clone(),
			event: rule.name.to_owned(),
			environment,
			severity: self.severity(state, severity),
			service,
			group,
			value: value_string(&eval_match.value),
			text,
			tags,
			attributes,
			customer,
			origin,
			event_type: EVENT_TYPE.to_owned(),
			timeout: defaults.timeout,
			raw_data: Some(rule.raw_data.clone()),
			..Default::default()
		}
	}
}

impl Webhook for GrafanaWebhook {
	fn incoming(&self, defaults: &RequestDefaults, payload: &[u8]) -> Result<Mapped, PayloadError> {
		let notification = Notification::parse(payload)?;
		self.map(defaults, &notification)
	}
}

/// rule level values shared by all matches of a notification
struct Rule<'a> {
	name: &'a str,
	id: &'a str,
	raw_data: String,
}

fn link(url: &str, label: &str) -> String {
	format!("<a href=\"{url}\" target=\"_blank\">{label}</a>")
}

fn value_string(value: &Value) -> String {
	match value {
		Value::String(value) => value.clone(),
		other => other.to_string(),
	}
}
