//! PUT_TO: move bottles from the robot's back platform into release slots
//! around the cell.

use std::{collections::BTreeSet, sync::Arc};

use serde_json::Value;
use tracing::{debug, warn};
use workcell::{cmd::PutToParams, err, Error, Result};

use super::{goto, result_doc, step_timeout, turn, FailedBottle};
use crate::{
	inventory::SlotView,
	planner::{self, PutRequest, SlotSim},
	robot::{Link, SafePose},
	tasks::Service,
};

pub(super) async fn handle(service: &Arc<Service>, task_id: &str, params: PutToParams) -> Result<Value> {
	let wait = step_timeout(params.timeout, service);
	let link = service.robot.primary();
	let total = params.release_params.len();

	let mut failed: Vec<FailedBottle> = Vec::new();
	let mut requests: Vec<PutRequest> = Vec::new();
	// the platform pose each bottle currently occupies
	let mut sources: Vec<(String, String)> = Vec::new();

	for release in &params.release_params {
		match resolve(service, &release.bottle_id, &release.release_pose) {
			| Ok((request, platform_pose)) => {
				sources.push((request.bottle_id.clone(), platform_pose));
				requests.push(request);
			},
			| Err(e) => failed.push(FailedBottle::new(&release.bottle_id, "resolve", &e)),
		}
	}

	let mut slots = SlotSim::new(release_views(service, &requests));
	let plan = planner::plan_put(&requests, &mut slots);
	failed.extend(plan.rejected.into_iter().map(FailedBottle::planner));

	let mut success_count = 0;
	'legs: for leg in plan.legs {
		if service.is_cancelled(task_id) {
			break;
		}

		service.set_step(task_id, &format!("navigate:{}", leg.navigation_pose));
		if let Err(e) = goto(&link, &leg.navigation_pose, wait).await {
			warn!(nav = %leg.navigation_pose, "leg aborted: {e}");
			for request in &leg.bottles {
				failed.push(FailedBottle::new(&request.bottle_id, "navigation_to_pose", &e));
			}
			continue 'legs;
		}

		for request in &leg.bottles {
			if service.is_cancelled(task_id) {
				break 'legs;
			}

			let platform_pose = sources
				.iter()
				.find(|(id, _)| *id == request.bottle_id)
				.map(|(_, pose)| pose.clone())
				.expect("every planned put was resolved");

			service.set_step(task_id, &format!("put:{}", request.bottle_id));
			match put_one(service, &link, request, &platform_pose, wait).await {
				| Ok(()) => success_count += 1,
				| Err((step, e)) => {
					debug!(bottle_id = %request.bottle_id, step, "bottle failed: {e}");
					failed.push(FailedBottle::new(&request.bottle_id, step, &e));
				},
			}
		}
	}

	Ok(result_doc(success_count, total, &failed))
}

/// The bottle must sit on the back platform; the release slot must exist.
fn resolve(service: &Service, bottle_id: &str, release_pose: &str) -> Result<(PutRequest, String)> {
	let bottle = service.inventory.lookup_bottle(bottle_id)?;

	let Some(location) = bottle.location else {
		return Err(err!(BottleNotFound("{bottle_id} is not on the back platform")));
	};
	let source = service.inventory.lookup_slot(&location)?;
	if !source.category.on_robot() {
		return Err(err!(BottleNotFound("{bottle_id} is not on the back platform")));
	}

	let release = service.inventory.slot_view(release_pose)?;

	Ok((
		PutRequest {
			bottle_id: bottle.bottle_id,
			object_type: bottle.object_type,
			release_pose: release.pose_name,
			navigation_pose: release.navigation_pose,
			hand: bottle.hand,
		},
		source.pose_name,
	))
}

pub(super) fn release_views(service: &Service, requests: &[PutRequest]) -> Vec<SlotView> {
	let poses: BTreeSet<&str> = requests.iter().map(|r| r.release_pose.as_str()).collect();
	poses
		.into_iter()
		.filter_map(|pose| service.inventory.slot_view(pose).ok())
		.collect()
}

/// turn 180 → grab off the platform → turn back → put into the release
/// slot, then move the ledger entry.
pub(super) async fn put_one(
	service: &Service,
	link: &Arc<Link>,
	request: &PutRequest,
	platform_pose: &str,
	wait: std::time::Duration,
) -> Result<(), (&'static str, Error)> {
	let inventory = &service.inventory;

	let reservation = inventory
		.reserve_slot(&request.release_pose, &request.bottle_id, request.object_type)
		.map_err(|e| ("reserve_slot", e))?;

	if let Err(e) = turn(link, 180, wait).await {
		inventory.cancel_reservation(reservation);
		return Err(("turn_waist", e));
	}

	if let Err(e) = link
		.grab_object(request.object_type.as_str(), platform_pose, request.hand, wait)
		.await
	{
		inventory.cancel_reservation(reservation);
		return Err(("grab_object", e));
	}

	if let Err(e) = turn(link, 0, wait).await {
		inventory.cancel_reservation(reservation);
		return Err(("turn_waist", e));
	}

	if let Err(e) = link
		.put_object(
			request.object_type.as_str(),
			&request.release_pose,
			request.hand,
			SafePose::Preset,
			wait,
		)
		.await
	{
		inventory.cancel_reservation(reservation);
		return Err(("put_object", e));
	}

	if let Err(e) = inventory.commit_remove(platform_pose, &request.bottle_id) {
		inventory.cancel_reservation(reservation);
		return Err(("commit", e));
	}
	inventory
		.commit_place(reservation, &request.bottle_id)
		.map_err(|e| ("commit", e))?;

	Ok(())
}
