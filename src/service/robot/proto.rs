//! Robot wire frames: JSON-RPC style calls over the WebSocket link.
//!
//! Requests carry `{"op":"call_service","id":n,"service":...,"args":{...}}`;
//! the peer echoes the id in a `service_response` frame with a boolean
//! `result` and a `values` payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(super) const OP_CALL_SERVICE: &str = "call_service";
pub(super) const OP_SERVICE_RESPONSE: &str = "service_response";

#[derive(Debug, Serialize)]
pub(super) struct Request<'a> {
	pub(super) op: &'static str,
	pub(super) id: u64,
	pub(super) service: &'a str,
	pub(super) args: Value,
}

#[derive(Debug, Deserialize)]
pub(super) struct Response {
	pub(super) op: String,

	#[serde(default)]
	pub(super) id: Option<u64>,

	#[serde(default)]
	pub(super) result: bool,

	#[serde(default)]
	pub(super) values: Value,

	#[serde(default)]
	pub(super) message: Option<String>,
}
