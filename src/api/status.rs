//! Poll surfaces: task snapshots, queue counters and the health document.

use axum::{
	extract::{Path, State},
	Json,
};
use serde_json::{json, Value};
use workcell::{version, version::name, Result};

pub(crate) async fn get_task(
	State(services): State<crate::State>,
	Path(task_id): Path<String>,
) -> Result<Json<Value>> {
	let record = services.tasks.status(&task_id)?;
	Ok(Json(serde_json::to_value(record)?))
}

pub(crate) async fn queue_status(State(services): State<crate::State>) -> Json<Value> {
	Json(services.tasks.queue_status())
}

pub(crate) async fn health(State(services): State<crate::State>) -> Json<Value> {
	Json(json!({
		"name": name(),
		"version": version(),
		"status": "ok",
		"uptime_secs": services.server.uptime_secs(),
		"robots": services.robot.status(),
	}))
}
