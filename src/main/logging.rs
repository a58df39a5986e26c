use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};
use workcell::{err, Config, Result};

/// Install the global tracing subscriber: a console fmt layer filtered by
/// the configured directives, plus an append-only file sink when
/// `log_path` is set.
pub(crate) fn init(config: &Config) -> Result {
	let console_filter = filter(&config.log);
	let console_layer = tracing_subscriber::fmt::Layer::new().with_filter(console_filter);
	let subscriber = Registry::default().with(console_layer);

	let result = match &config.log_path {
		| Some(path) => {
			let file = std::fs::OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)?;
			let file_layer = tracing_subscriber::fmt::Layer::new()
				.with_ansi(false)
				.with_writer(Arc::new(file))
				.with_filter(filter(&config.log));

			subscriber.with(file_layer).try_init()
		},
		| None => subscriber.try_init(),
	};

	result.map_err(|e| err!("tracing init failed: {e}"))
}

fn filter(directives: &str) -> EnvFilter {
	EnvFilter::try_new(directives).unwrap_or_else(|e| {
		eprintln!("invalid log directives ({e}), falling back to \"info\"");
		EnvFilter::new("info")
	})
}
