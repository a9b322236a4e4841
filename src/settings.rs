use anyhow::{Context, Result};
use clap::{Arg, Command};
use config::Config;
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::{
    backend::BackendSettings, log::LogSettings, mapper::MapperSettings,
    webhook_receiver::WebhookReceiverSettings,
};

static SETTINGS: OnceCell<Settings> = OnceCell::new();

/// prefix of environment variables overriding config file values, e.g.
/// `GRAFHOOK__GRAFANA__TAGS_AS_TAGS=true`
const ENV_PREFIX: &str = "GRAFHOOK";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub log: LogSettings,
    pub webhook_receiver: WebhookReceiverSettings,
    #[serde(default)]
    pub grafana: MapperSettings,
    pub backend: BackendSettings,
}

impl Settings {
    pub fn global() -> &'static Self {
        SETTINGS.get_or_init(|| {
            match Self::load().context("failed to load config and command line arguments") {
                Ok(settings) => settings,
                Err(err) => {
                    // tracing wasn't setup yet
                    panic!("{:#?}", err);
                }
            }
        })
    }

    fn load() -> Result<Self> {
        let opts = Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .author(clap::crate_authors!())
            .args([
                Arg::new("config")
                    .help("path of config file")
                    .takes_value(true)
                    .short('c')
                    .long("config")
                    .default_value("./config.yaml"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["Error", "Warn", "Info", "Debug", "Trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log"),
            ])
            .get_matches();

        let config_path = opts.value_of("config").unwrap_or("./config.yaml");

        let mut settings = Self::from_sources(config_path)?;

        if let Some(level) = opts.value_of("level") {
            settings.log.level = level.to_string();
        }

        Ok(settings)
    }

    /// config file overlayed with `GRAFHOOK__` prefixed environment variables
    fn from_sources(config_path: &str) -> Result<Self> {
        let conf = Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("can't load config")?;

        conf.try_deserialize().context("can't load config")
    }
}
