//! One resilient WebSocket link to one robot.
//!
//! The read side is owned by a single reader task that demultiplexes
//! `service_response` frames onto waiters keyed by request id. The write
//! side is serialized under a mutex. When the reader observes close or
//! error it fails every outstanding waiter with `Disconnected` and starts a
//! background reconnect honoring the configured retry policy.

use std::{
	collections::HashMap,
	future::Future,
	pin::Pin,
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use futures::{
	stream::{SplitSink, SplitStream},
	SinkExt, StreamExt,
};
use serde_json::Value;
use tokio::{
	net::{lookup_host, TcpStream},
	sync::oneshot,
	time::timeout,
};
use tokio_tungstenite::{client_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;
use workcell::{err, Error, Result, Server};

use super::proto::{Request, Response, OP_CALL_SERVICE, OP_SERVICE_RESPONSE};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type Waiter = oneshot::Sender<Result<Value>>;

pub struct Link {
	server: Arc<Server>,
	name: String,
	url: Url,

	next_id: AtomicU64,
	connected: AtomicBool,
	reconnecting: AtomicBool,

	/// Bumped on every (re)connection and close so a stale reader cannot
	/// tear down a newer link.
	generation: AtomicU64,

	write: tokio::sync::Mutex<Option<WsSink>>,
	waiters: Mutex<HashMap<u64, Waiter>>,
}

impl Link {
	pub(super) fn new(server: Arc<Server>, name: &str, url: Url) -> Arc<Self> {
		Arc::new(Self {
			server,
			name: name.to_owned(),
			url,
			next_id: AtomicU64::new(1),
			connected: AtomicBool::new(false),
			reconnecting: AtomicBool::new(false),
			generation: AtomicU64::new(0),
			write: tokio::sync::Mutex::new(None),
			waiters: Mutex::new(HashMap::new()),
		})
	}

	#[inline]
	#[must_use]
	pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

	#[must_use]
	pub fn status(&self) -> Value {
		serde_json::json!({
			"name": self.name,
			"url": self.url.as_str(),
			"connected": self.is_connected(),
		})
	}

	/// Resolve, dial and upgrade. Each phase fails distinctly so the log
	/// tells DNS trouble from a refused port from a broken peer.
	async fn dial(&self) -> Result<WsStream> {
		let host = self
			.url
			.host_str()
			.ok_or_else(|| err!(Disconnected("robot url {} has no host", self.url)))?;
		let port = self.url.port_or_known_default().unwrap_or(80);

		let addrs: Vec<_> = lookup_host((host, port))
			.await
			.map_err(|e| err!(Disconnected("dns resolution failed for {host}: {e}")))?
			.collect();

		let stream = TcpStream::connect(addrs.as_slice())
			.await
			.map_err(|e| err!(Disconnected("tcp connect to {host}:{port} failed: {e}")))?;

		let (ws, _response) = client_async(self.url.as_str(), stream)
			.await
			.map_err(|e| err!(Disconnected("websocket handshake with {host}:{port} failed: {e}")))?;

		Ok(ws)
	}

	/// Single connection attempt; on success the reader task for this
	/// generation is running.
	pub fn connect(self: &Arc<Self>) -> Pin<Box<dyn Future<Output = Result> + Send + '_>> {
		Box::pin(async move {
			let ws = self.dial().await?;
			let (sink, source) = ws.split();

			let generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
			*self.write.lock().await = Some(sink);
			self.connected.store(true, Ordering::Release);

			let link = Arc::clone(self);
			self.server
				.runtime()
				.spawn(async move { link.reader(source, generation).await });

			info!(name = %self.name, url = %self.url, "robot link established");
			Ok(())
		})
	}

	/// Connection attempts under the configured retry policy. Used for the
	/// initial link at startup and by the background reconnect.
	pub async fn connect_with_retry(self: &Arc<Self>) -> Result {
		let interval = self.server.config.retry_interval();
		let budget = self.server.config.max_retry_attempts;
		let mut attempts: u32 = 0;

		loop {
			match self.connect().await {
				| Ok(()) => return Ok(()),
				| Err(e) => {
					attempts = attempts.saturating_add(1);
					if budget.is_some_and(|max| attempts >= max) {
						return Err(err!(RobotInit(
							"{} unreachable after {attempts} attempts: {e}",
							self.name
						)));
					}

					warn!(name = %self.name, attempts, "robot connect failed: {e}");
					tokio::time::sleep(interval).await;
				},
			}
		}
	}

	#[tracing::instrument(skip_all, fields(name = %self.name))]
	async fn reader(self: Arc<Self>, mut source: WsSource, generation: u64) {
		let reason = loop {
			match source.next().await {
				| Some(Ok(Message::Text(text))) => self.demux(text.as_str()),
				| Some(Ok(Message::Close(_))) => break "peer closed the link".to_owned(),
				| Some(Ok(_)) => {}, // ping/pong/binary are not part of the protocol
				| Some(Err(e)) => break format!("read error: {e}"),
				| None => break "stream ended".to_owned(),
			}
		};

		// only the reader of the live generation may declare the link down
		if self.generation.load(Ordering::Acquire) == generation {
			self.on_disconnect(&reason).await;
		}
	}

	fn demux(&self, text: &str) {
		let response: Response = match serde_json::from_str(text) {
			| Ok(response) => response,
			| Err(e) => {
				warn!(name = %self.name, "unparseable frame from robot: {e}");
				return;
			},
		};

		if response.op != OP_SERVICE_RESPONSE {
			debug!(name = %self.name, op = %response.op, "ignoring non-response frame");
			return;
		}

		let Some(id) = response.id else {
			warn!(name = %self.name, "service_response without id dropped");
			return;
		};

		let waiter = self
			.waiters
			.lock()
			.expect("waiter mutex poisoned")
			.remove(&id);
		let Some(waiter) = waiter else {
			debug!(name = %self.name, id, "response with no live waiter dropped");
			return;
		};

		let outcome = if response.result {
			Ok(response.values)
		} else {
			Err(Error::RemoteError {
				action: format!("request {id}"),
				message: response.message.unwrap_or_else(|| "unspecified".to_owned()),
			})
		};

		_ = waiter.send(outcome);
	}

	async fn on_disconnect(self: &Arc<Self>, reason: &str) {
		warn!(name = %self.name, "robot link lost: {reason}");
		self.connected.store(false, Ordering::Release);
		*self.write.lock().await = None;

		let waiters: Vec<Waiter> = {
			let mut map = self.waiters.lock().expect("waiter mutex poisoned");
			map.drain().map(|(_, waiter)| waiter).collect()
		};
		for waiter in waiters {
			_ = waiter.send(Err(err!(Disconnected("{reason}"))));
		}

		if self.server.running() && !self.reconnecting.swap(true, Ordering::AcqRel) {
			let link = Arc::clone(self);
			self.server.runtime().spawn(async move {
				let result = link.connect_with_retry().await;
				link.reconnecting.store(false, Ordering::Release);
				if let Err(e) = result {
					error!(name = %link.name, "background reconnect gave up: {e}");
				}
			});
		}
	}

	/// Issue one service call and await its reply.
	///
	/// When the link is down a single synchronous reconnect is attempted
	/// before giving up with `Disconnected`. A timeout removes the waiter;
	/// a reply arriving later is dropped as an orphan by the reader.
	pub async fn send_request(
		self: &Arc<Self>,
		service: &str,
		action: &str,
		args: Value,
		wait: Duration,
	) -> Result<Value> {
		if !self.is_connected() {
			self.connect()
				.await
				.map_err(|e| err!(Disconnected("{} is down and reconnect failed: {e}", self.name)))?;
		}

		let mut args = args;
		args.as_object_mut()
			.expect("primitive args are a JSON object")
			.insert("action".to_owned(), action.into());

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let frame = serde_json::to_string(&Request {
			op: OP_CALL_SERVICE,
			id,
			service,
			args,
		})?;

		let (tx, rx) = oneshot::channel();
		self.waiters
			.lock()
			.expect("waiter mutex poisoned")
			.insert(id, tx);

		let sent = {
			let mut write = self.write.lock().await;
			match write.as_mut() {
				| Some(sink) => sink.send(Message::text(frame)).await.map_err(|e| err!(Disconnected("send to {} failed: {e}", self.name))),
				| None => Err(err!(Disconnected("{} has no live socket", self.name))),
			}
		};

		if let Err(e) = sent {
			self.remove_waiter(id);
			self.on_disconnect(&e.to_string()).await;
			return Err(e);
		}

		debug!(name = %self.name, id, service, action, "request sent");

		match timeout(wait, rx).await {
			| Ok(Ok(outcome)) => outcome.map_err(|e| match e {
				// the reader only knows the id; name the action here
				| Error::RemoteError { message, .. } => Error::RemoteError {
					action: action.to_owned(),
					message,
				},
				| e => e,
			}),
			| Ok(Err(_)) => Err(err!(Disconnected("{} dropped the link mid-request", self.name))),
			| Err(_) => {
				self.remove_waiter(id);
				Err(Error::PrimitiveTimeout(wait))
			},
		}
	}

	fn remove_waiter(&self, id: u64) {
		self.waiters
			.lock()
			.expect("waiter mutex poisoned")
			.remove(&id);
	}

	/// Graceful close for shutdown; the generation bump keeps the reader
	/// from scheduling a reconnect.
	pub async fn close(&self) {
		self.generation.fetch_add(1, Ordering::AcqRel);
		self.connected.store(false, Ordering::Release);

		let mut write = self.write.lock().await;
		if let Some(mut sink) = write.take() {
			_ = sink.send(Message::Close(None)).await;
			_ = sink.close().await;
		}
	}
}
