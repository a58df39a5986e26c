use std::{net::SocketAddr, sync::Arc};

use axum_server::{bind, Handle as ServerHandle};
use tracing::info;
use workcell::Result;
use workcell_service::Services;

use crate::layers;

pub(crate) async fn serve(services: &Arc<Services>, handle: ServerHandle) -> Result {
	let config = &services.server.config;
	let addr = SocketAddr::from((config.address, config.port));

	let app = layers::apply(workcell_api::router::build()).with_state(services.clone());

	info!("Listening on {addr}");
	bind(addr)
		.handle(handle)
		.serve(app.into_make_service())
		.await?;
	info!("Stopped listening on {addr}");

	Ok(())
}
