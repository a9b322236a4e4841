//! request level defaults passed as query parameters on the webhook url
//!
//! e.g. `/webhooks/grafana?environment=Development&service=web&service=db`
use url::form_urlencoded;

/// fallback values for alert fields which aren't set via tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct RequestDefaults {
	pub environment: Option<String>,
	pub severity: Option<String>,
	/// `service` can be repeated, order is preserved
	pub service: Vec<String>,
	pub group: Option<String>,
	pub customer: Option<String>,
	pub origin: Option<String>,
	pub timeout: Option<i64>,
}

impl RequestDefaults {
	/// Parses the raw query string of the request. For keys other than
	/// `service` the first occurrence wins, unknown keys are ignored.
	pub fn from_query(query: &str) -> Self {
		let mut defaults = Self::default();

		for (key, value) in form_urlencoded::parse(query.as_bytes()) {
			let slot = match key.as_ref() {
				"environment" => &mut defaults.environment,
				"severity" => &mut defaults.severity,
				"group" => &mut defaults.group,
				"customer" => &mut defaults.customer,
				"origin" => &mut defaults.origin,
				"service" => {
					defaults.service.push(value.into_owned());
					continue;
				}
				"timeout" => {
					if defaults.timeout.is_none() {
						match value.parse() {
							Ok(timeout) => defaults.timeout = Some(timeout),
							Err(_) => tracing::debug!(%value, "ignoring non integer timeout"),
						}
					}
					continue;
				}
				_ => continue,
			};

			slot.get_or_insert_with(|| value.into_owned());
		}

		defaults
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn repeated_service_keeps_order() {
		let defaults = RequestDefaults::from_query("service=web&environment=Dev&service=db&service=web");

		assert_eq!(defaults.service, vec!["web", "db", "web"]);
		assert_eq!(defaults.environment.as_deref(), Some("Dev"));
	}

	#[test]
	fn first_occurrence_wins() {
		let defaults = RequestDefaults::from_query("group=a&group=b");

		assert_eq!(defaults.group.as_deref(), Some("a"));
	}

	#[test]
	fn timeout_must_be_an_integer() {
		assert_eq!(RequestDefaults::from_query("timeout=600").timeout, Some(600));
		assert_eq!(RequestDefaults::from_query("timeout=soon").timeout, None);
	}

	#[test]
	fn values_are_percent_decoded() {
		let defaults = RequestDefaults::from_query("customer=ACME%20Corp&origin=grafana%2Fprod");

		assert_eq!(defaults.customer.as_deref(), Some("ACME Corp"));
		assert_eq!(defaults.origin.as_deref(), Some("grafana/prod"));
	}

	#[test]
	fn empty_query() {
		assert_eq!(RequestDefaults::from_query(""), RequestDefaults::default());
	}
}
