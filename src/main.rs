//! grafana webhook receiver that forwards normalized alerts into alerta
//!
//! Features:
//! - one alert per breached metric of an alerting grafana rule
//! - alert fields configurable via webhook url query parameters and grafana tags
//! - closes the alerts of a rule once grafana reports the rule as ok

use anyhow::{Context, Result};
use settings::Settings;

use crate::{mapper::GrafanaWebhook, webhook_receiver::State};

mod alert;
mod backend;
mod defaults;
mod error;
mod log;
mod mapper;
mod payload;
mod settings;
mod tags;
mod webhook_receiver;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	log::setup_logging().context("could not setup logging")?;

	let settings = Settings::global();

	let backend = settings.backend.build().context("failed to construct alert backend")?;

	let state = State::new(
		GrafanaWebhook::new(settings.grafana.clone()),
		backend,
		settings.webhook_receiver.base_url.clone(),
	);

	webhook_receiver::run_webhook_receiver(state)
		.await
		.context("grafana webhook receiver failed to start or crashed")
}
