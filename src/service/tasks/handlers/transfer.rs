//! TAKE_BOTTOL_FROM_SP_TO_SP: chained pickup and put batches through the
//! back platform.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use tracing::{debug, warn};
use workcell::{cmd::TransferParams, Result};

use super::{
	check_transfer_ids, goto,
	put_to::{put_one, release_views},
	result_doc, step_timeout, FailedBottle,
};
use crate::{
	planner::{self, PlatformSim, PutRequest, SlotSim, TransferLeg},
	tasks::Service,
};

pub(super) async fn handle(
	service: &Arc<Service>,
	task_id: &str,
	params: TransferParams,
) -> Result<Value> {
	check_transfer_ids(&params)?;

	let wait = step_timeout(params.timeout, service);
	let link = service.robot.primary();
	let total = params.target_params.len();

	let mut failed: Vec<FailedBottle> = Vec::new();
	let mut pickups = Vec::new();
	let mut puts = Vec::new();

	let release_by_id: BTreeMap<&str, &str> = params
		.release_params
		.iter()
		.map(|r| (r.bottle_id.as_str(), r.release_pose.as_str()))
		.collect();

	for target in &params.target_params {
		let release_pose = release_by_id[target.bottle_id.as_str()];
		match resolve_pair(service, &target.bottle_id, release_pose) {
			| Ok((pickup, put)) => {
				pickups.push(pickup);
				puts.push(put);
			},
			| Err(e) => failed.push(FailedBottle::new(&target.bottle_id, "resolve", &e)),
		}
	}

	let mut platform = PlatformSim::new(&service.inventory.back_platform_view());
	let mut slots = SlotSim::new(release_views(service, &puts));
	let plan = planner::plan_transfer(&pickups, &puts, &mut platform, &mut slots);
	failed.extend(plan.rejected.into_iter().map(FailedBottle::planner));

	// platform pose per bottle, filled as pickups land
	let mut on_platform: BTreeMap<String, String> = BTreeMap::new();
	let mut success_count = 0;

	'legs: for leg in plan.legs {
		if service.is_cancelled(task_id) {
			break;
		}

		match leg {
			| TransferLeg::Pickup(leg) => {
				service.set_step(task_id, &format!("navigate:{}", leg.navigation_pose));
				if let Err(e) = goto(&link, &leg.navigation_pose, wait).await {
					warn!(nav = %leg.navigation_pose, "pickup leg aborted: {e}");
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
					match super::pick_up::pick_one(service, &link, planned, wait).await {
						| Ok(()) => {
							on_platform.insert(
								planned.request.bottle_id.clone(),
								planned.platform_pose.clone(),
							);
						},
						| Err((step, e)) => {
							debug!(bottle_id = %planned.request.bottle_id, step, "bottle failed: {e}");
							failed.push(FailedBottle::new(&planned.request.bottle_id, step, &e));
						},
					}
				}
			},
			| TransferLeg::Put(leg) => {
				// bottles whose pickup failed were recorded there already
				let deliverable: Vec<&PutRequest> = leg
					.bottles
					.iter()
					.filter(|r| on_platform.contains_key(&r.bottle_id))
					.collect();
				if deliverable.is_empty() {
					continue 'legs;
				}

				service.set_step(task_id, &format!("navigate:{}", leg.navigation_pose));
				if let Err(e) = goto(&link, &leg.navigation_pose, wait).await {
					warn!(nav = %leg.navigation_pose, "put leg aborted: {e}");
					for request in deliverable {
						failed.push(FailedBottle::new(&request.bottle_id, "navigation_to_pose", &e));
					}
					continue 'legs;
				}

				for request in deliverable {
					if service.is_cancelled(task_id) {
						break 'legs;
					}

					let platform_pose = on_platform[&request.bottle_id].clone();
					service.set_step(task_id, &format!("put:{}", request.bottle_id));
					match put_one(service, &link, request, &platform_pose, wait).await {
						| Ok(()) => {
							on_platform.remove(&request.bottle_id);
							success_count += 1;
						},
						| Err((step, e)) => {
							debug!(bottle_id = %request.bottle_id, step, "bottle failed: {e}");
							failed.push(FailedBottle::new(&request.bottle_id, step, &e));
						},
					}
				}
			},
		}
	}

	Ok(result_doc(success_count, total, &failed))
}

fn resolve_pair(
	service: &Service,
	bottle_id: &str,
	release_pose: &str,
) -> Result<(planner::PickupRequest, PutRequest)> {
	let pickup = super::pick_up::resolve(service, bottle_id)?;
	let release = service.inventory.slot_view(release_pose)?;

	let put = PutRequest {
		bottle_id: pickup.bottle_id.clone(),
		object_type: pickup.object_type,
		release_pose: release.pose_name,
		navigation_pose: release.navigation_pose,
		hand: pickup.hand,
	};

	Ok((pickup, put))
}
