//! ordered tag mappings as they arrive in grafana notifications
//!
//! Reserved keys are consumed while resolving alert fields, everything else is
//! passed through as attributes or `key=value` tags.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// an insertion ordered tag mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagMap {
	/// the map object we're wrapping
	inner: IndexMap<String, String>,
}

/// values of the reserved keys taken out of a [TagMap]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct ReservedTags {
	pub environment: Option<String>,
	pub severity: Option<String>,
	pub service: Option<String>,
	pub group: Option<String>,
	pub customer: Option<String>,
	pub origin: Option<String>,
}

impl TagMap {
	#[cfg(test)]
	pub fn get(&self, key: &str) -> Option<&str> {
		self.inner.get(key).map(String::as_str)
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	#[cfg(test)]
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Splits the map into the values of the reserved keys (`environment`,
	/// `severity`, `service`, `group`, `customer`, `origin`) and the residual
	/// mapping. The residual keeps the order of the remaining tags.
	pub fn take_reserved(mut self) -> (ReservedTags, TagMap) {
		let mut take = |key: &str| self.inner.shift_remove(key);

		let reserved = ReservedTags {
			environment: take("environment"),
			severity: take("severity"),
			service: take("service"),
			group: take("group"),
			customer: take("customer"),
			origin: take("origin"),
		};

		(reserved, self)
	}

	/// tags as attribute entries, dots in keys are replaced by underscores
	pub fn attributes(&self) -> impl Iterator<Item = (String, Value)> + '_ {
		self.inner.iter().map(|(k, v)| (k.replace('.', "_"), Value::String(v.clone())))
	}

	/// tags rendered as `key=value`
	pub fn tags(&self) -> impl Iterator<Item = String> + '_ {
		self.inner.iter().map(|(k, v)| format!("{k}={v}"))
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagMap {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self { inner: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
	}
}

/// grafana tag values are strings, but we don't reject scalars. numbers and
/// booleans are kept in their json text form, `null` values are dropped
impl<'de> Deserialize<'de> for TagMap {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let raw = Option::<IndexMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();

		let inner = raw
			.into_iter()
			.filter_map(|(k, v)| match v {
				Value::Null => None,
				Value::String(s) => Some((k, s)),
				other => Some((k, other.to_string())),
			})
			.collect();

		Ok(Self { inner })
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn take_reserved_splits_off_reserved_keys() {
		let tags: TagMap = [
			("environment", "Staging"),
			("host.name", "web-1"),
			("service", "api"),
			("team", "infra"),
		]
		.into_iter()
		.collect();

		let (reserved, residual) = tags.take_reserved();

		assert_eq!(reserved.environment.as_deref(), Some("Staging"));
		assert_eq!(reserved.service.as_deref(), Some("api"));
		assert_eq!(reserved.severity, None);
		assert_eq!(residual.iter().collect::<Vec<_>>(), vec![("host.name", "web-1"), ("team", "infra")]);
	}

	#[test]
	fn attribute_keys_replace_dots() {
		let tags: TagMap = [("host.name", "web-1")].into_iter().collect();

		let attributes: Vec<_> = tags.attributes().collect();

		assert_eq!(attributes, vec![("host_name".to_owned(), json!("web-1"))]);
	}

	#[test]
	fn tags_render_as_key_value() {
		let tags: TagMap = [("a", "1"), ("b.c", "2")].into_iter().collect();

		assert_eq!(tags.tags().collect::<Vec<_>>(), vec!["a=1", "b.c=2"]);
	}

	#[test]
	fn deserialize_stringifies_scalars_and_drops_null() {
		let tags: TagMap =
			serde_json::from_value(json!({"port": 8080, "up": true, "gone": null, "name": "x"}))
				.unwrap();

		assert_eq!(tags.iter().collect::<Vec<_>>(), vec![("port", "8080"), ("up", "true"), ("name", "x")]);
	}

	#[test]
	fn deserialize_null_map_is_empty() {
		let tags: TagMap = serde_json::from_value(Value::Null).unwrap();

		assert!(tags.is_empty());
	}
}
