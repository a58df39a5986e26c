//! The command ingress: one POST endpoint taking the envelope.
//!
//! Long-running commands are queued and answered with a task id;
//! synchronous commands (BOTTLE_GET, ENTER_ID, CANCEL, SCAN_QRCODE_RESULT)
//! are answered in full within the exchange.

use axum::{
	extract::{rejection::JsonRejection, State},
	Json,
};
use serde_json::{json, Value};
use tracing::{debug, info};
use workcell::{
	cmd::{BottleGetParams, CancelParams, CmdType, EnterIdParams, Envelope, ScanQrcodeResultParams},
	err, Result,
};
use workcell_service::{inventory::SummaryFilter, tasks};

pub(crate) async fn post_command(
	State(services): State<crate::State>,
	envelope: Result<Json<Envelope>, JsonRejection>,
) -> Result<Json<Value>> {
	let Json(envelope) = envelope.map_err(|e| err!(BadRequest("invalid command envelope: {e}")))?;

	let cmd_type = tasks::validate(&envelope)?;
	debug!(cmd_id = %envelope.cmd_id, %cmd_type, "command received");

	if cmd_type.is_async() {
		let (task_id, queue_size) = services.tasks.submit(envelope)?;
		return Ok(Json(json!({
			"success": true,
			"task_id": task_id,
			"message": "任务已加入队列",
			"queue_size": queue_size,
		})));
	}

	match cmd_type {
		| CmdType::BottleGet => {
			let params: BottleGetParams = envelope.params()?;
			let filter = SummaryFilter {
				bottle_id: params.bottle_id,
				pose_name: params.pose_name,
				detail: params.detail_params.unwrap_or_default().detail,
			};

			Ok(Json(json!({
				"success": true,
				"code": 0,
				"data": services.inventory.summary(&filter),
			})))
		},
		| CmdType::EnterId => {
			let params: EnterIdParams = envelope.params()?;
			services.tasks.enter_id(&params.bottle_id, params.object_type)?;
			info!(bottle_id = %params.bottle_id, "enter-id accepted");

			Ok(Json(json!({
				"success": true,
				"code": 0,
				"message": "id accepted",
			})))
		},
		| CmdType::Cancel => {
			let params: CancelParams = envelope.params()?;
			services.tasks.cancel(&params.task_id)?;

			Ok(Json(json!({
				"success": true,
				"code": 0,
				"task_id": params.task_id,
				"message": "cancellation requested",
			})))
		},
		| CmdType::ScanQrcodeResult => {
			let params: ScanQrcodeResultParams = envelope.params()?;
			let record = services.tasks.status(&params.task_id)?;

			Ok(Json(json!({
				"success": true,
				"code": 0,
				"task": record,
			})))
		},
		| _ => Err(err!(UnknownCmdType("{cmd_type}"))),
	}
}
