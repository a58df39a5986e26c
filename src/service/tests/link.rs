//! Robot link tests against a scripted WebSocket peer.

use std::{
	net::SocketAddr,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use figment::{
	providers::{Format, Toml},
	Figment,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use workcell_core::{error::Code, Config, Error, Server};
use workcell_service::robot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
	/// Acknowledge every call with `result: true`.
	Ack,
	/// Reject every call with `result: false`.
	Refuse,
	/// Read requests, never answer.
	Silent,
	/// Close the first connection upon its first request, then ack.
	CloseOnRequest,
}

async fn spawn_peer(mode: Mode) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock peer");
	let addr = listener.local_addr().expect("local addr");
	let connections = Arc::new(AtomicUsize::new(0));

	tokio::spawn(async move {
		while let Ok((stream, _)) = listener.accept().await {
			let n = connections.fetch_add(1, Ordering::SeqCst);
			tokio::spawn(handle_connection(stream, mode, n));
		}
	});

	addr
}

async fn handle_connection(stream: TcpStream, mode: Mode, connection: usize) {
	let Ok(mut ws) = accept_async(stream).await else { return };

	if mode == Mode::CloseOnRequest && connection == 0 {
		// swallow the first request and hang up with it in flight
		_ = ws.next().await;
		_ = ws.close(None).await;
		return;
	}

	while let Some(Ok(message)) = ws.next().await {
		let Ok(text) = message.to_text() else { continue };
		if text.is_empty() {
			continue;
		}
		let Ok(frame) = serde_json::from_str::<Value>(text) else { continue };
		let Some(id) = frame["id"].as_u64() else { continue };

		let reply = match mode {
			| Mode::Silent => continue,
			| Mode::Refuse => json!({
				"op": "service_response",
				"id": id,
				"result": false,
				"message": "arm fault",
			}),
			| _ => json!({
				"op": "service_response",
				"id": id,
				"result": true,
				"values": {},
			}),
		};

		if ws.send(Message::text(reply.to_string())).await.is_err() {
			return;
		}
	}
}

fn server(addr: SocketAddr) -> Arc<Server> {
	let toml = format!(
		"retry_interval = 1\n\n[[robots]]\nname = \"r2\"\nurl = \"ws://{addr}\"\n"
	);
	let raw = Figment::new().merge(Toml::string(&toml));
	let config = Config::new(&raw).expect("test config is valid");

	Arc::new(Server::new(config, Some(tokio::runtime::Handle::current())))
}

#[tokio::test]
async fn correlates_concurrent_requests() {
	let addr = spawn_peer(Mode::Ack).await;
	let service = robot::Service::build(&server(addr)).unwrap();
	let link = service.primary();
	link.connect().await.expect("mock peer accepts");

	let wait = Duration::from_secs(2);
	let (a, b, c) = tokio::join!(
		link.send_request("/navigation_status", "waiting_navigation_status", json!({}), wait),
		link.send_request("/get_strawberry_service", "scan", json!({}), wait),
		link.navigation_to_pose("shelf_a", wait),
	);

	a.expect("first call acked");
	b.expect("second call acked");
	c.expect("primitive wrapper acked");
}

#[tokio::test]
async fn remote_refusal_is_a_remote_error() {
	let addr = spawn_peer(Mode::Refuse).await;
	let service = robot::Service::build(&server(addr)).unwrap();
	let link = service.primary();
	link.connect().await.unwrap();

	let err = link
		.grab_object("glass_bottle_500", "shelf_a_500_001", workcell_core::model::Hand::Left, Duration::from_secs(2))
		.await
		.unwrap_err();

	assert_eq!(err.code(), Code::RemoteError);
	assert!(matches!(err, Error::RemoteError { .. }));
	assert!(err.message().contains("arm fault"));
}

#[tokio::test]
async fn timeout_removes_the_waiter() {
	let addr = spawn_peer(Mode::Silent).await;
	let service = robot::Service::build(&server(addr)).unwrap();
	let link = service.primary();
	link.connect().await.unwrap();

	let err = link
		.scan(Duration::from_millis(200))
		.await
		.unwrap_err();
	assert_eq!(err.code(), Code::PrimitiveTimeout);

	// the link stays usable; a late reply for the dead id is dropped as an
	// orphan rather than crossing wires with the next request
	let err = link.scan(Duration::from_millis(200)).await.unwrap_err();
	assert_eq!(err.code(), Code::PrimitiveTimeout);
}

#[tokio::test]
async fn disconnect_fails_in_flight_and_reconnects() {
	let addr = spawn_peer(Mode::CloseOnRequest).await;
	let service = robot::Service::build(&server(addr)).unwrap();
	let link = service.primary();
	link.connect().await.expect("handshake succeeds before the drop");

	// the peer hangs up with our request in flight; the reader fails the
	// waiter rather than leaving it to time out
	let err = link
		.scan(Duration::from_secs(2))
		.await
		.unwrap_err();
	assert_eq!(err.code(), Code::Disconnected);

	// the next call finds the link down and the single synchronous
	// reconnect brings it back against the now-acking peer
	tokio::time::sleep(Duration::from_millis(100)).await;
	link.scan(Duration::from_secs(2))
		.await
		.expect("recovered after reconnect");
}

#[tokio::test]
async fn initial_connect_budget_exhaustion_is_fatal() {
	// nothing listens here; one attempt, no retries left
	let toml = "max_retry_attempts = 1\nretry_interval = 1\n\n[[robots]]\nname = \"r2\"\nurl = \"ws://127.0.0.1:1\"\n";
	let raw = Figment::new().merge(Toml::string(toml));
	let config = Config::new(&raw).unwrap();
	let server = Arc::new(Server::new(config, Some(tokio::runtime::Handle::current())));

	let service = robot::Service::build(&server).unwrap();
	let err = service.start().await.unwrap_err();

	assert!(matches!(err, Error::RobotInit(_)));
	assert_eq!(err.exit_code(), 3);
}
