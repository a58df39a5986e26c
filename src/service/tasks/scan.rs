//! The SCAN_QRCODE workflow.
//!
//! A long-running session: grab the scan gun, detect bottles on the scan
//! table one by one, scan each, park WAITING until an operator answers with
//! ENTER_ID, stage the bottle on the back platform, and finally deliver
//! everything to the split station. The return-and-cancel subroutine puts
//! grabbed-but-uncommitted bottles back on their detect-temp poses so the
//! physical cell never diverges from the ledger.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use workcell::{
	model::{Hand, ObjectType},
	utils, Result,
};

use super::{
	handlers::{goto, turn, FailedBottle},
	Service,
};
use crate::{
	inventory::{Reservation, SlotView},
	robot::{Link, SafePose},
};

/// Session states, surfaced through `current_step`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
	NavigatingToScan,
	GrabScanGun,
	CvDetecting,
	GrabbingBottle,
	Scanning,
	WaitingIdInput,
	PuttingToBack,
	TurningBackFront,
	NavigatingToSplit,
	PuttingDown,
}

impl Step {
	fn as_str(&self) -> &'static str {
		match self {
			| Self::NavigatingToScan => "NAVIGATING_TO_SCAN",
			| Self::GrabScanGun => "GRAB_SCAN_GUN",
			| Self::CvDetecting => "CV_DETECTING",
			| Self::GrabbingBottle => "GRABBING_BOTTLE",
			| Self::Scanning => "SCANNING",
			| Self::WaitingIdInput => "WAITING_ID_INPUT",
			| Self::PuttingToBack => "PUTTING_TO_BACK",
			| Self::TurningBackFront => "TURNING_BACK_FRONT",
			| Self::NavigatingToSplit => "NAVIGATING_TO_SPLIT",
			| Self::PuttingDown => "PUTTING_DOWN",
		}
	}
}

#[derive(Clone, Debug, Serialize)]
struct ScannedBottle {
	bottle_id: String,
	object_type: ObjectType,
	slot: String,
	scanned_at: u64,
}

/// A bottle the arm holds (or staged this session) that is not yet
/// committed downstream; what return-and-cancel unwinds.
struct ReturnEntry {
	object_type: ObjectType,
	temp_pose: String,
	reservation: Reservation,
}

/// The wire name of the gun object on the arm service.
const SCAN_GUN_TYPE: &str = "scan_gun";

/// Consecutive empty detections that end the table sweep.
const NO_DETECTION_LIMIT: u32 = 2;

pub(super) async fn run(service: &Arc<Service>, task_id: &str) -> Result<Value> {
	let inventory = service.inventory.clone();
	let link = service.robot.primary();
	let scan = inventory.scan_config().clone();
	let wait = service.server.config.request_timeout();

	let mut scanned: Vec<ScannedBottle> = Vec::new();
	let mut failed: Vec<FailedBottle> = Vec::new();
	let mut return_stack: Vec<ReturnEntry> = Vec::new();

	let step = |s: Step| service.set_step(task_id, s.as_str());

	step(Step::NavigatingToScan);
	goto(&link, &scan.navigation_pose, wait).await?;

	step(Step::GrabScanGun);
	link.grab_object(SCAN_GUN_TYPE, &scan.gun_pose, scan.gun_hand, wait)
		.await?;

	let mut no_detection: u32 = 0;
	let mut cancelled = false;

	loop {
		if service.is_cancelled(task_id) {
			cancelled = true;
			break;
		}

		step(Step::CvDetecting);
		let detection = match link.cv_detect(wait).await {
			| Ok(Some(detection)) => {
				no_detection = 0;
				detection
			},
			| Ok(None) => {
				no_detection += 1;
				debug!(no_detection, "scan table empty pass");
				if no_detection >= NO_DETECTION_LIMIT {
					break;
				}
				continue;
			},
			| Err(e) => {
				return_and_cancel(&link, &inventory, &mut return_stack, scan.bottle_hand, wait).await;
				return Err(e);
			},
		};

		// hold platform space before touching the bottle; a full cell ends
		// the sweep with whatever was fully processed
		let Some(platform_pose) = free_platform_slot(&inventory.back_platform_view(), detection.bottle_type)
		else {
			warn!(
				target_pose = %detection.target_pose,
				bottle_type = %detection.bottle_type,
				"back platform full, ending scan sweep"
			);
			failed.push(FailedBottle {
				bottle_id: detection.target_pose.clone(),
				step: "reserve_slot".to_owned(),
				code: workcell::error::Code::PlatformFull.u16(),
				message: format!("no free back-platform slot for {}", detection.bottle_type),
			});
			break;
		};
		let reservation =
			match inventory.reserve_slot(&platform_pose, task_id, detection.bottle_type) {
				| Ok(reservation) => reservation,
				| Err(e) => {
					failed.push(FailedBottle::new(&detection.target_pose, "reserve_slot", &e));
					break;
				},
			};

		step(Step::GrabbingBottle);
		if let Err(e) = link
			.grab_object(
				detection.bottle_type.as_str(),
				&detection.target_pose,
				scan.bottle_hand,
				wait,
			)
			.await
		{
			inventory.cancel_reservation(reservation);
			failed.push(FailedBottle::new(&detection.target_pose, "grab_object", &e));
			continue;
		}
		return_stack.push(ReturnEntry {
			object_type: detection.bottle_type,
			temp_pose: detection.target_pose.clone(),
			reservation,
		});

		step(Step::Scanning);
		if let Err(e) = link.scan(wait).await {
			put_back(&link, &inventory, return_stack.pop(), scan.bottle_hand, wait).await;
			failed.push(FailedBottle::new(&detection.target_pose, "scan", &e));
			continue;
		}

		step(Step::WaitingIdInput);
		let gate = service.wait_for_enter_id(
			task_id,
			detection.bottle_type,
			json!({
				"target_pose": detection.target_pose,
				"type": detection.bottle_type,
			}),
		);

		let bottle_id = match gate.await {
			| Ok(bottle_id) => bottle_id,
			| Err(_) => {
				// gate dropped: cancellation or shutdown while parked
				service.resume_running(task_id);
				cancelled = true;
				break;
			},
		};
		service.resume_running(task_id);
		info!(task_id, bottle_id, "bottle identified");

		let entry = return_stack.pop().expect("grabbed bottle is on the return stack");

		// bind while the bottle is still in hand; a rejected id puts it
		// back on its detect-temp pose instead of stranding it on the
		// platform with the ledger reporting the slot free
		if let Err(e) = inventory.bind_bottle(&bottle_id, entry.object_type, scan.bottle_hand) {
			put_back(&link, &inventory, Some(entry), scan.bottle_hand, wait).await;
			failed.push(FailedBottle::new(&bottle_id, "bind", &e));
			continue;
		}

		step(Step::PuttingToBack);
		if let Err((step_name, e)) =
			stage_on_platform(&link, &entry, scan.bottle_hand, wait).await
		{
			put_back(&link, &inventory, Some(entry), scan.bottle_hand, wait).await;
			failed.push(FailedBottle::new(&bottle_id, step_name, &e));
			continue;
		}

		let platform_pose = entry.reservation.pose_name.clone();
		inventory.commit_place(entry.reservation, &bottle_id)?;

		scanned.push(ScannedBottle {
			bottle_id,
			object_type: entry.object_type,
			slot: platform_pose,
			scanned_at: utils::millis_since_unix_epoch(),
		});
	}

	if cancelled || !return_stack.is_empty() {
		return_and_cancel(&link, &inventory, &mut return_stack, scan.bottle_hand, wait).await;
	}

	step(Step::TurningBackFront);
	if let Err(e) = turn(&link, 0, wait).await {
		warn!("post-sweep waist reset failed: {e}");
	}

	let mut delivered = 0;
	if !cancelled && !scanned.is_empty() {
		step(Step::NavigatingToSplit);
		match goto(&link, &scan.split_navigation_pose, wait).await {
			| Ok(()) => {
				step(Step::PuttingDown);
				delivered =
					put_down(service, &link, &scanned, scan.bottle_hand, wait, &mut failed).await;
			},
			| Err(e) => {
				// the bottles stay staged on the platform, ledger intact
				for bottle in &scanned {
					failed.push(FailedBottle::new(&bottle.bottle_id, "navigation_to_pose", &e));
				}
			},
		}
	}

	let total = scanned.len() + failed.len();
	let message = if cancelled {
		format!("scan session cancelled, {} bottles processed", scanned.len())
	} else {
		format!("{} bottles scanned, {delivered} delivered", scanned.len())
	};

	Ok(json!({
		"success": !cancelled && failed.is_empty(),
		"message": message,
		"success_count": scanned.len(),
		"scanned_bottles": scanned,
		"failed_bottles": failed,
		"total": total,
	}))
}

/// First back-platform slot of the family with space left.
fn free_platform_slot(view: &[SlotView], object_type: ObjectType) -> Option<String> {
	view.iter()
		.find(|slot| slot.accepted_type == Some(object_type) && slot.free > 0)
		.map(|slot| slot.pose_name.clone())
}

/// turn 180 → put on the reserved platform slot → turn back.
async fn stage_on_platform(
	link: &Arc<Link>,
	entry: &ReturnEntry,
	hand: Hand,
	wait: std::time::Duration,
) -> Result<(), (&'static str, workcell::Error)> {
	turn(link, 180, wait).await.map_err(|e| ("turn_waist", e))?;

	link.put_object(
		entry.object_type.as_str(),
		&entry.reservation.pose_name,
		hand,
		SafePose::Preset,
		wait,
	)
	.await
	.map_err(|e| ("put_object", e))?;

	turn(link, 0, wait).await.map_err(|e| ("turn_waist", e))?;
	Ok(())
}

/// Put one held bottle back on its detect-temp pose and release its hold.
async fn put_back(
	link: &Arc<Link>,
	inventory: &crate::inventory::Service,
	entry: Option<ReturnEntry>,
	hand: Hand,
	wait: std::time::Duration,
) {
	let Some(entry) = entry else { return };

	if let Err(e) = link
		.put_object(entry.object_type.as_str(), &entry.temp_pose, hand, SafePose::Preset, wait)
		.await
	{
		error!(temp_pose = %entry.temp_pose, "returning bottle to scan table failed: {e}");
	}

	inventory.cancel_reservation(entry.reservation);
}

/// Unwind every grabbed-but-uncommitted bottle, newest first.
async fn return_and_cancel(
	link: &Arc<Link>,
	inventory: &crate::inventory::Service,
	return_stack: &mut Vec<ReturnEntry>,
	hand: Hand,
	wait: std::time::Duration,
) {
	while let Some(entry) = return_stack.pop() {
		info!(temp_pose = %entry.temp_pose, "returning bottle to scan table");
		put_back(link, inventory, Some(entry), hand, wait).await;
	}
}

/// Deliver staged bottles from the platform into the split-station slots.
async fn put_down(
	service: &Service,
	link: &Arc<Link>,
	scanned: &[ScannedBottle],
	hand: Hand,
	wait: std::time::Duration,
	failed: &mut Vec<FailedBottle>,
) -> usize {
	let inventory = &service.inventory;
	let split_nav = inventory.scan_config().split_navigation_pose.clone();
	let mut delivered = 0;

	for bottle in scanned {
		let candidates: Vec<SlotView> = inventory
			.slots_by_navigation(&split_nav)
			.into_iter()
			.map(|slot| SlotView {
				free: slot.free(),
				pose_name: slot.pose_name,
				navigation_pose: slot.navigation_pose,
				accepted_type: slot.accepted_type,
			})
			.collect();

		let Some(dest) = candidates
			.iter()
			.find(|slot| slot.accepted_type == Some(bottle.object_type) && slot.free > 0)
		else {
			failed.push(FailedBottle {
				bottle_id: bottle.bottle_id.clone(),
				step: "reserve_slot".to_owned(),
				code: workcell::error::Code::SlotFull.u16(),
				message: format!("no split-station slot for {}", bottle.object_type),
			});
			continue;
		};

		let reservation =
			match inventory.reserve_slot(&dest.pose_name, &bottle.bottle_id, bottle.object_type) {
				| Ok(reservation) => reservation,
				| Err(e) => {
					failed.push(FailedBottle::new(&bottle.bottle_id, "reserve_slot", &e));
					continue;
				},
			};

		let sequence = async {
			turn(link, 180, wait).await.map_err(|e| ("turn_waist", e))?;
			link.grab_object(bottle.object_type.as_str(), &bottle.slot, hand, wait)
				.await
				.map_err(|e| ("grab_object", e))?;
			turn(link, 0, wait).await.map_err(|e| ("turn_waist", e))?;
			link.put_object(
				bottle.object_type.as_str(),
				&dest.pose_name,
				hand,
				SafePose::Preset,
				wait,
			)
			.await
			.map_err(|e| ("put_object", e))?;
			Ok::<(), (&'static str, workcell::Error)>(())
		};

		match sequence.await {
			| Ok(()) => {
				if let Err(e) = inventory.commit_remove(&bottle.slot, &bottle.bottle_id) {
					inventory.cancel_reservation(reservation);
					failed.push(FailedBottle::new(&bottle.bottle_id, "commit", &e));
					continue;
				}
				if let Err(e) = inventory.commit_place(reservation, &bottle.bottle_id) {
					failed.push(FailedBottle::new(&bottle.bottle_id, "commit", &e));
					continue;
				}
				delivered += 1;
			},
			| Err((step_name, e)) => {
				inventory.cancel_reservation(reservation);
				failed.push(FailedBottle::new(&bottle.bottle_id, step_name, &e));
			},
		}
	}

	delivered
}
