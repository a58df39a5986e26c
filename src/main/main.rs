pub(crate) mod clap;
mod lock;
mod logging;
mod runtime;
mod server;
mod signal;

extern crate workcell_core as workcell;
extern crate workcell_router as router;

use std::{process::ExitCode, sync::Arc, time::Duration};

use tracing::error;
use workcell::Result;

use crate::server::Server;

fn main() -> ExitCode {
	let args = clap::parse();

	match run(&args) {
		| Ok(()) => ExitCode::SUCCESS,
		| Err(e) => {
			eprintln!("workcell: {e}");
			ExitCode::from(e.exit_code())
		},
	}
}

fn run(args: &clap::Args) -> Result {
	let runtime = runtime::new()?;
	let server = Server::build(args, Some(runtime.handle()))?;

	if args.check_config {
		println!("configuration ok");
		return Ok(());
	}

	let _lock = lock::acquire(&server.server.config.pid_file)?;

	runtime.spawn(signal::signal(server.server.clone()));
	let result = runtime.block_on(async_main(&server.server));
	runtime.shutdown_timeout(Duration::from_secs(5));

	result
}

/// Operate the server normally within the asynchronous runtime: start,
/// run and stop.
#[tracing::instrument(name = "main", skip_all)]
async fn async_main(server: &Arc<workcell::Server>) -> Result {
	let services = match router::start(server.clone()).await {
		| Ok(services) => services,
		| Err(e) => {
			error!("Critical error starting server: {e}");
			return Err(e);
		},
	};

	if let Err(e) = router::run(services.clone()).await {
		error!("Critical error running server: {e}");
		_ = router::stop(services).await;
		return Err(e);
	}

	router::stop(services).await?;
	Ok(())
}
