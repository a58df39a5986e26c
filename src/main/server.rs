use std::sync::Arc;

use tokio::runtime;
use tracing::info;
use workcell::{version, Config, Result};

use crate::{clap::Args, logging};

/// Server runtime state; complete
pub(crate) struct Server {
	/// Server runtime state; public portion
	pub(crate) server: Arc<workcell::Server>,
}

impl Server {
	pub(crate) fn build(args: &Args, runtime: Option<&runtime::Handle>) -> Result<Arc<Self>> {
		let raw = Config::load(args.config.as_deref());
		let config = Config::new(&raw)?;

		logging::init(&config)?;
		info!(
			address = %config.address,
			port = config.port,
			robots = config.robots.len(),
			"{} {}",
			version::name(),
			version(),
		);

		Ok(Arc::new(Self {
			server: Arc::new(workcell::Server::new(config, runtime.cloned())),
		}))
	}
}
