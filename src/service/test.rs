#![cfg(test)]

use std::sync::Arc;

use figment::{
	providers::{Format, Toml},
	Figment,
};
use workcell::{Config, Server};

/// A server over the default layout and a single unreachable robot. Tests
/// that need a live peer override the robot url.
pub(crate) fn server() -> Arc<Server> {
	server_with(
		r#"
		[[robots]]
		name = "r2"
		url = "ws://127.0.0.1:1"
		"#,
	)
}

pub(crate) fn server_with(toml: &str) -> Arc<Server> {
	let raw = Figment::new().merge(Toml::string(toml));
	let config = Config::new(&raw).expect("test config is valid");
	Arc::new(Server::new(config, None))
}
