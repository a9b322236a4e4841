use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing_subscriber::{
    filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

use crate::settings::Settings;

/// the http stacks log every connection on `info`
fn default_directives() -> Vec<String> {
    vec![String::from("hyper=warn"), String::from("reqwest=warn")]
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    /// per module filters like `grafhook::backend=debug`, applied on top of `level`
    #[serde(default = "default_directives")]
    pub directives: Vec<String>,
    /// colored output
    #[serde(default = "enabled")]
    pub ansi: bool,
}

impl LogSettings {
    pub fn global() -> &'static Self {
        &Settings::global().log
    }

    fn filter(&self) -> Result<EnvFilter> {
        let level = tracing::Level::from_str(&self.level).context("invalid log level")?;

        self.directives.iter().try_fold(
            EnvFilter::default().add_directive(LevelFilter::from_level(level).into()),
            |filter, directive| {
                let directive = directive
                    .parse()
                    .with_context(|| format!("invalid log directive `{directive}`"))?;
                Ok(filter.add_directive(directive))
            },
        )
    }
}

pub fn setup_logging() -> Result<()> {
    let settings = LogSettings::global();

    let fmt_layer = fmt::layer().with_ansi(settings.ansi);

    let filter_layer = settings.filter()?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str, directives: &[&str]) -> LogSettings {
        LogSettings {
            level: level.to_owned(),
            directives: directives.iter().map(|d| d.to_string()).collect(),
            ansi: false,
        }
    }

    #[test]
    fn directives_are_added_to_the_level() {
        let filter = settings("info", &["grafhook::backend=debug", "hyper=warn"])
            .filter()
            .unwrap()
            .to_string();

        assert!(filter.contains("grafhook::backend=debug"), "{filter}");
        assert!(filter.contains("hyper=warn"), "{filter}");
        assert!(filter.contains("info"), "{filter}");
    }

    #[test]
    fn bad_level_or_directive_is_an_error() {
        assert!(settings("loud", &[]).filter().is_err());
        assert!(settings("info", &["hyper=loudest"]).filter().is_err());
    }

    #[test]
    fn defaults_quiet_the_http_stack() {
        let settings: LogSettings = serde_json::from_value(serde_json::json!({"level": "Debug"})).unwrap();

        assert_eq!(settings.directives, vec!["hyper=warn", "reqwest=warn"]);
        assert!(settings.ansi);
    }
}
