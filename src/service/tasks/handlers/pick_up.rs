//! PICK_UP: move the named bottles from their shelf slots onto the robot's
//! back platform.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use workcell::{cmd::PickUpParams, err, Error, Result};

use super::{goto, result_doc, step_timeout, turn, FailedBottle};
use crate::{
	planner::{self, PickupRequest, PlannedPickup, PlatformSim},
	robot::{Link, SafePose},
	tasks::Service,
};

pub(super) async fn handle(service: &Arc<Service>, task_id: &str, params: PickUpParams) -> Result<Value> {
	let wait = step_timeout(params.timeout, service);
	let link = service.robot.primary();
	let total = params.target_params.len();

	let mut failed: Vec<FailedBottle> = Vec::new();
	let mut requests: Vec<PickupRequest> = Vec::new();
	for target in &params.target_params {
		match resolve(service, &target.bottle_id) {
			| Ok(request) => requests.push(request),
			| Err(e) => failed.push(FailedBottle::new(&target.bottle_id, "resolve", &e)),
		}
	}

	let mut platform = PlatformSim::new(&service.inventory.back_platform_view());
	let plan = planner::plan_pickup(&requests, &mut platform);
	failed.extend(plan.rejected.into_iter().map(FailedBottle::planner));

	let mut success_count = 0;
	'legs: for leg in plan.legs {
		if service.is_cancelled(task_id) {
			break;
		}

		service.set_step(task_id, &format!("navigate:{}", leg.navigation_pose));
		if let Err(e) = goto(&link, &leg.navigation_pose, wait).await {
			warn!(nav = %leg.navigation_pose, "leg aborted: {e}");
			for planned in &leg.bottles {
				failed.push(FailedBottle::new(
					&planned.request.bottle_id,
					"navigation_to_pose",
					&e,
				));
			}
			continue 'legs;
		}

		for planned in &leg.bottles {
			if service.is_cancelled(task_id) {
				break 'legs;
			}

			service.set_step(task_id, &format!("pick:{}", planned.request.bottle_id));
			match pick_one(service, &link, planned, wait).await {
				| Ok(()) => success_count += 1,
				| Err((step, e)) => {
					debug!(bottle_id = %planned.request.bottle_id, step, "bottle failed: {e}");
					failed.push(FailedBottle::new(&planned.request.bottle_id, step, &e));
				},
			}
		}
	}

	Ok(result_doc(success_count, total, &failed))
}

/// Canonical pickup coordinates for one bottle from inventory.
pub(super) fn resolve(service: &Service, bottle_id: &str) -> Result<PickupRequest> {
	let bottle = service.inventory.lookup_bottle(bottle_id)?;

	let Some(location) = bottle.location else {
		return Err(err!(BottleNotFound("{bottle_id} has no known location")));
	};
	let slot = service.inventory.lookup_slot(&location)?;

	if slot.category.on_robot() {
		return Err(err!(PlatformFull("{bottle_id} is already on the back platform")));
	}

	Ok(PickupRequest {
		bottle_id: bottle.bottle_id,
		object_type: bottle.object_type,
		navigation_pose: slot.navigation_pose,
		target_pose: slot.pose_name,
		hand: bottle.hand,
	})
}

/// grab → turn 180 → put on the platform → turn back. The inventory commit
/// happens once the bottle is physically on the platform, so a failing
/// final turn still leaves the ledger truthful.
pub(super) async fn pick_one(
	service: &Service,
	link: &Arc<Link>,
	planned: &PlannedPickup,
	wait: std::time::Duration,
) -> Result<(), (&'static str, Error)> {
	let request = &planned.request;
	let inventory = &service.inventory;

	let reservation = inventory
		.reserve_slot(&planned.platform_pose, &request.bottle_id, request.object_type)
		.map_err(|e| ("reserve_slot", e))?;

	if let Err(e) = link
		.grab_object(request.object_type.as_str(), &request.target_pose, request.hand, wait)
		.await
	{
		inventory.cancel_reservation(reservation);
		return Err(("grab_object", e));
	}

	if let Err(e) = turn(link, 180, wait).await {
		inventory.cancel_reservation(reservation);
		return Err(("turn_waist", e));
	}

	if let Err(e) = link
		.put_object(
			request.object_type.as_str(),
			&planned.platform_pose,
			request.hand,
			SafePose::Preset,
			wait,
		)
		.await
	{
		inventory.cancel_reservation(reservation);
		return Err(("put_object", e));
	}

	if let Err(e) = inventory.commit_remove(&request.target_pose, &request.bottle_id) {
		inventory.cancel_reservation(reservation);
		return Err(("commit", e));
	}
	inventory
		.commit_place(reservation, &request.bottle_id)
		.map_err(|e| ("commit", e))?;

	turn(link, 0, wait).await.map_err(|e| ("turn_waist", e))?;
	Ok(())
}
