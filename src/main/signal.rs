use std::sync::Arc;

use tokio::signal;
use tracing::{debug, warn};
use workcell::Server;

#[cfg(unix)]
pub(super) async fn signal(server: Arc<Server>) {
	use signal::unix;

	let mut quit = unix::signal(unix::SignalKind::quit()).expect("SIGQUIT handler");
	let mut term = unix::signal(unix::SignalKind::terminate()).expect("SIGTERM handler");

	let sig: &'static str;
	tokio::select! {
		_ = signal::ctrl_c() => { sig = "SIGINT"; },
		_ = quit.recv() => { sig = "SIGQUIT"; },
		_ = term.recv() => { sig = "SIGTERM"; },
	}

	warn!("Received {sig}");
	if let Err(e) = server.shutdown() {
		debug!(?sig, "shutdown: {e}");
	}
}

#[cfg(not(unix))]
pub(super) async fn signal(server: Arc<Server>) {
	_ = signal::ctrl_c().await;
	warn!("Received Ctrl+C");
	if let Err(e) = server.shutdown() {
		debug!("shutdown: {e}");
	}
}
