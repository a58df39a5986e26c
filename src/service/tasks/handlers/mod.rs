//! One handler per cmd_type, plus the envelope validation shared with the
//! HTTP ingress.

mod pick_up;
mod put_to;
mod transfer;

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::{json, Value};
use workcell::{
	cmd::{CmdType, Envelope, PickUpParams, PutToParams, ScanQrcodeParams, TransferParams},
	err, Error, Result,
};

use super::{scan, Service};
use crate::{planner::Rejected, robot::Link};

/// How often an idempotent primitive (navigation, waist) is attempted
/// before its failure is recorded.
const IDEMPOTENT_ATTEMPTS: u32 = 2;

/// Validate an envelope before it is queued; shape problems are rejected at
/// the ingress, not discovered mid-run by the worker.
pub fn validate(envelope: &Envelope) -> Result<CmdType> {
	let cmd_type = envelope.cmd_type()?;

	match cmd_type {
		| CmdType::PickUp => {
			let params: PickUpParams = envelope.params()?;
			if params.target_params.is_empty() {
				return Err(err!(BadRequest("target_params must not be empty")));
			}
		},
		| CmdType::PutTo => {
			let params: PutToParams = envelope.params()?;
			if params.release_params.is_empty() {
				return Err(err!(BadRequest("release_params must not be empty")));
			}
		},
		| CmdType::Transfer => {
			let params: TransferParams = envelope.params()?;
			check_transfer_ids(&params)?;
		},
		| CmdType::ScanQrcode => {
			envelope.params::<ScanQrcodeParams>()?;
		},
		| _ => {},
	}

	Ok(cmd_type)
}

/// TAKE_BOTTOL_FROM_SP_TO_SP must name every bottle exactly once on both
/// sides; anything else is protocol drift.
fn check_transfer_ids(params: &TransferParams) -> Result {
	let targets: BTreeSet<&str> = params
		.target_params
		.iter()
		.map(|t| t.bottle_id.as_str())
		.collect();
	let releases: BTreeSet<&str> = params
		.release_params
		.iter()
		.map(|r| r.bottle_id.as_str())
		.collect();

	if targets.len() != params.target_params.len() || releases.len() != params.release_params.len() {
		return Err(err!(BadRequest("duplicate bottle_id in transfer params")));
	}

	if targets != releases {
		return Err(err!(BadRequest(
			"target_params and release_params must name the same bottles"
		)));
	}

	if targets.is_empty() {
		return Err(err!(BadRequest("transfer params must not be empty")));
	}

	Ok(())
}

/// Worker-side dispatch for queued commands.
pub(super) async fn execute(service: &Arc<Service>, task_id: &str, envelope: &Envelope) -> Result<Value> {
	match envelope.cmd_type()? {
		| CmdType::PickUp => pick_up::handle(service, task_id, envelope.params()?).await,
		| CmdType::PutTo => put_to::handle(service, task_id, envelope.params()?).await,
		| CmdType::Transfer => transfer::handle(service, task_id, envelope.params()?).await,
		| CmdType::ScanQrcode => scan::run(service, task_id).await,
		| other => Err(err!(UnknownCmdType("{other} is not a queued command"))),
	}
}

/// One entry of the `failed_bottles` result list.
#[derive(Clone, Debug, Serialize)]
pub(super) struct FailedBottle {
	pub(super) bottle_id: String,
	pub(super) step: String,
	pub(super) code: u16,
	pub(super) message: String,
}

impl FailedBottle {
	pub(super) fn new(bottle_id: &str, step: &str, error: &Error) -> Self {
		Self {
			bottle_id: bottle_id.to_owned(),
			step: step.to_owned(),
			code: error.code().u16(),
			message: error.message(),
		}
	}

	pub(super) fn planner(rejected: Rejected) -> Self {
		Self {
			bottle_id: rejected.bottle_id,
			step: "plan".to_owned(),
			code: rejected.code.u16(),
			message: rejected.reason,
		}
	}
}

pub(super) fn result_doc(success_count: usize, total: usize, failed: &[FailedBottle]) -> Value {
	let message = if failed.is_empty() {
		format!("{success_count}/{total} bottles processed")
	} else {
		format!("{success_count}/{total} bottles processed, {} failed", failed.len())
	};

	json!({
		"success": failed.is_empty() && success_count == total,
		"message": message,
		"success_count": success_count,
		"failed_bottles": failed,
		"total": total,
	})
}

fn retryable(error: &Error) -> bool {
	matches!(error, Error::PrimitiveTimeout(_) | Error::Disconnected(_))
}

/// Navigate the robot to a waypoint: wait out any in-flight navigation,
/// then move. Both actions are idempotent and retried once on
/// timeout/disconnect.
pub(super) async fn goto(link: &Arc<Link>, navigation_pose: &str, wait: Duration) -> Result {
	let mut outcome = Ok(());
	for _ in 0..IDEMPOTENT_ATTEMPTS {
		outcome = link.waiting_navigation_status(wait).await;
		match &outcome {
			| Ok(()) => break,
			| Err(e) if retryable(e) => continue,
			| Err(_) => return outcome,
		}
	}
	outcome?;

	let mut outcome = Ok(());
	for _ in 0..IDEMPOTENT_ATTEMPTS {
		outcome = link.navigation_to_pose(navigation_pose, wait).await;
		match &outcome {
			| Ok(()) => break,
			| Err(e) if retryable(e) => continue,
			| Err(_) => return outcome,
		}
	}

	outcome
}

/// Waist rotation with the same bounded retry.
pub(super) async fn turn(link: &Arc<Link>, angle: i64, wait: Duration) -> Result {
	let mut outcome = Ok(());
	for _ in 0..IDEMPOTENT_ATTEMPTS {
		outcome = link.turn_waist(angle, true, wait).await;
		match &outcome {
			| Ok(()) => break,
			| Err(e) if retryable(e) => continue,
			| Err(_) => return outcome,
		}
	}

	outcome
}

/// The per-primitive reply timeout: the command's override or the
/// configured default.
pub(super) fn step_timeout(params_timeout: Option<u64>, service: &Service) -> Duration {
	params_timeout
		.map(Duration::from_secs)
		.unwrap_or_else(|| service.server.config.request_timeout())
}
