extern crate workcell_core as workcell;

mod layers;
mod serve;

use std::{sync::Arc, time::Duration};

use axum_server::Handle as ServerHandle;
use tracing::{debug, error};
use workcell::{Result, Server};
use workcell_service::Services;

/// Grace period for in-flight HTTP exchanges on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Async initializations
pub async fn start(server: Arc<Server>) -> Result<Arc<Services>> {
	debug!("Starting...");

	let services = Services::build(server).await?.start().await?;

	debug!("Started");
	Ok(services)
}

/// Main loop base
#[tracing::instrument(skip_all)]
pub async fn run(services: Arc<Services>) -> Result {
	let server = &services.server;
	debug!("Start");

	let handle = ServerHandle::new();
	let mut signal = server.signal.subscribe();
	let sig_handle = handle.clone();
	let sigs = server.runtime().spawn(async move {
		_ = signal.recv().await;
		sig_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
	});

	let result = serve::serve(&services, handle).await;

	sigs.abort();
	_ = sigs.await;

	if let Err(e) = &result {
		error!("Critical error running server: {e}");
	}

	result
}

/// Async destructions
pub async fn stop(services: Arc<Services>) -> Result {
	debug!("Shutting down...");

	services.stop().await;

	debug!("Shutdown complete");
	Ok(())
}
