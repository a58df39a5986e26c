//! Route planning for bottle movements.
//!
//! All three variants group work by navigation pose so the number of legs
//! equals the number of distinct waypoints the non-rejected bottles need;
//! the robot never revisits a waypoint within one plan. Ordering is fully
//! deterministic: groups by size descending then name, bottles by family
//! then id, so plans are stable under test.

mod tests;

use std::collections::BTreeMap;

use itertools::Itertools;
use workcell::{
	error::Code,
	model::{Hand, ObjectType},
};

use crate::inventory::SlotView;

/// A bottle the caller wants moved onto the back platform, with its
/// canonical coordinates from inventory.
#[derive(Clone, Debug)]
pub struct PickupRequest {
	pub bottle_id: String,
	pub object_type: ObjectType,
	pub navigation_pose: String,
	pub target_pose: String,
	pub hand: Hand,
}

/// A bottle on the back platform destined for a release slot.
#[derive(Clone, Debug)]
pub struct PutRequest {
	pub bottle_id: String,
	pub object_type: ObjectType,
	pub release_pose: String,
	pub navigation_pose: String,
	pub hand: Hand,
}

/// A pickup the simulation accepted, bound to the platform slot it will
/// occupy.
#[derive(Clone, Debug)]
pub struct PlannedPickup {
	pub request: PickupRequest,
	pub platform_pose: String,
}

#[derive(Clone, Debug)]
pub struct PickupLeg {
	pub navigation_pose: String,
	pub bottles: Vec<PlannedPickup>,
}

#[derive(Clone, Debug)]
pub struct PutLeg {
	pub navigation_pose: String,
	pub bottles: Vec<PutRequest>,
}

#[derive(Clone, Debug)]
pub struct Rejected {
	pub bottle_id: String,
	pub code: Code,
	pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct PickupPlan {
	pub legs: Vec<PickupLeg>,
	pub rejected: Vec<Rejected>,
}

#[derive(Clone, Debug, Default)]
pub struct PutPlan {
	pub legs: Vec<PutLeg>,
	pub rejected: Vec<Rejected>,
}

/// TRANSFER output: alternating pickup/put sub-plans.
#[derive(Clone, Debug)]
pub enum TransferLeg {
	Pickup(PickupLeg),
	Put(PutLeg),
}

#[derive(Clone, Debug, Default)]
pub struct TransferPlan {
	pub legs: Vec<TransferLeg>,
	pub rejected: Vec<Rejected>,
}

/// Capacity simulation of the robot's back platform. Seeded from an
/// inventory snapshot; the planner burns simulated holds as it admits
/// bottles so no plan can overfill a typed slot.
#[derive(Clone, Debug)]
pub struct PlatformSim {
	slots: BTreeMap<ObjectType, Vec<(String, usize)>>,
}

impl PlatformSim {
	#[must_use]
	pub fn new(view: &[SlotView]) -> Self {
		let mut slots: BTreeMap<ObjectType, Vec<(String, usize)>> = BTreeMap::new();
		for slot in view {
			let Some(object_type) = slot.accepted_type else {
				continue;
			};
			slots
				.entry(object_type)
				.or_default()
				.push((slot.pose_name.clone(), slot.free));
		}

		Self { slots }
	}

	#[must_use]
	pub fn free_for(&self, object_type: ObjectType) -> usize {
		self.slots
			.get(&object_type)
			.map(|v| v.iter().map(|(_, free)| free).sum())
			.unwrap_or_default()
	}

	/// Burn one hold of the given family, returning the slot pose it landed
	/// in.
	pub fn reserve(&mut self, object_type: ObjectType) -> Option<String> {
		self.slots
			.get_mut(&object_type)?
			.iter_mut()
			.find(|(_, free)| *free > 0)
			.map(|(pose, free)| {
				*free -= 1;
				pose.clone()
			})
	}

	/// Return one hold after the bottle leaves the platform again.
	pub fn release(&mut self, object_type: ObjectType, pose: &str) {
		if let Some(slots) = self.slots.get_mut(&object_type) {
			if let Some((_, free)) = slots.iter_mut().find(|(p, _)| p == pose) {
				*free += 1;
			}
		}
	}
}

/// Capacity simulation of a set of release slots.
#[derive(Clone, Debug, Default)]
pub struct SlotSim {
	slots: BTreeMap<String, SlotView>,
}

impl SlotSim {
	#[must_use]
	pub fn new(views: impl IntoIterator<Item = SlotView>) -> Self {
		Self {
			slots: views
				.into_iter()
				.map(|v| (v.pose_name.clone(), v))
				.collect(),
		}
	}

	fn admit(&mut self, pose: &str, object_type: ObjectType) -> Result<(), Rejected> {
		let reject = |code, reason: String| Rejected {
			bottle_id: String::new(),
			code,
			reason,
		};

		let Some(view) = self.slots.get_mut(pose) else {
			return Err(reject(Code::SlotNotFound, format!("unknown slot: {pose}")));
		};

		if view.accepted_type.is_some_and(|t| t != object_type) {
			return Err(reject(
				Code::TypeMismatch,
				format!("{object_type} not accepted by {pose}"),
			));
		}

		if view.free == 0 {
			return Err(reject(Code::SlotFull, format!("slot is full: {pose}")));
		}

		view.free -= 1;
		Ok(())
	}
}

/// Variant A: many bottles onto the back platform, one leg per shelf
/// waypoint. Bigger groups go first so an early abort still yields the most
/// bottles.
#[must_use]
pub fn plan_pickup(requests: &[PickupRequest], platform: &mut PlatformSim) -> PickupPlan {
	let mut plan = PickupPlan::default();

	let mut groups: BTreeMap<&str, Vec<&PickupRequest>> = BTreeMap::new();
	for request in requests {
		groups
			.entry(request.navigation_pose.as_str())
			.or_default()
			.push(request);
	}

	let ordered = groups
		.into_iter()
		.sorted_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(b.0)));

	for (navigation_pose, mut group) in ordered {
		group.sort_by(|a, b| {
			a.object_type
				.cmp(&b.object_type)
				.then(a.bottle_id.cmp(&b.bottle_id))
		});

		let mut bottles = Vec::new();
		for request in group {
			match platform.reserve(request.object_type) {
				| Some(platform_pose) => bottles.push(PlannedPickup {
					request: request.clone(),
					platform_pose,
				}),
				| None => plan.rejected.push(Rejected {
					bottle_id: request.bottle_id.clone(),
					code: Code::PlatformFull,
					reason: format!("no free back-platform slot for {}", request.object_type),
				}),
			}
		}

		if !bottles.is_empty() {
			plan.legs.push(PickupLeg {
				navigation_pose: navigation_pose.to_owned(),
				bottles,
			});
		}
	}

	plan
}

/// Variant B: bottles off the back platform into release slots, one leg per
/// destination waypoint.
#[must_use]
pub fn plan_put(requests: &[PutRequest], slots: &mut SlotSim) -> PutPlan {
	let mut plan = PutPlan::default();

	let mut groups: BTreeMap<&str, Vec<&PutRequest>> = BTreeMap::new();
	for request in requests {
		groups
			.entry(request.navigation_pose.as_str())
			.or_default()
			.push(request);
	}

	let ordered = groups
		.into_iter()
		.sorted_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(b.0)));

	for (navigation_pose, mut group) in ordered {
		group.sort_by(|a, b| {
			a.release_pose
				.cmp(&b.release_pose)
				.then(a.bottle_id.cmp(&b.bottle_id))
		});

		let mut bottles = Vec::new();
		for request in group {
			match slots.admit(&request.release_pose, request.object_type) {
				| Ok(()) => bottles.push(request.clone()),
				| Err(mut rejected) => {
					rejected.bottle_id = request.bottle_id.clone();
					plan.rejected.push(rejected);
				},
			}
		}

		if !bottles.is_empty() {
			plan.legs.push(PutLeg {
				navigation_pose: navigation_pose.to_owned(),
				bottles,
			});
		}
	}

	plan
}

/// Variant C: chained pickup+put batches.
///
/// Each batch drains one source waypoint (the one with the most pending
/// pickups) into the platform, then releases everything before moving on.
/// Inside a batch, bottles whose destination waypoint is shared by the most
/// pending work go first, then same-release-pose clusters, then id.
#[must_use]
pub fn plan_transfer(
	pickups: &[PickupRequest],
	puts: &[PutRequest],
	platform: &mut PlatformSim,
	slots: &mut SlotSim,
) -> TransferPlan {
	let mut plan = TransferPlan::default();

	let puts_by_id: BTreeMap<&str, &PutRequest> =
		puts.iter().map(|p| (p.bottle_id.as_str(), p)).collect();

	let mut pending: Vec<&PickupRequest> = pickups.iter().collect();

	while !pending.is_empty() {
		// source waypoints, most remaining work first
		let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
		for pickup in &pending {
			*groups.entry(pickup.navigation_pose.as_str()).or_default() += 1;
		}
		let ordered_navs: Vec<String> = groups
			.into_iter()
			.sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)))
			.map(|(nav, _)| nav.to_owned())
			.collect();

		// destination popularity over everything still pending
		let mut dest_nav_count: BTreeMap<&str, usize> = BTreeMap::new();
		let mut dest_pose_count: BTreeMap<&str, usize> = BTreeMap::new();
		for pickup in &pending {
			let put = puts_by_id[pickup.bottle_id.as_str()];
			*dest_nav_count.entry(put.navigation_pose.as_str()).or_default() += 1;
			*dest_pose_count.entry(put.release_pose.as_str()).or_default() += 1;
		}

		let mut batch: Vec<PickupRequest> = Vec::new();
		let mut dropped: Vec<String> = Vec::new();
		for batch_nav in &ordered_navs {
			let mut candidates: Vec<&PickupRequest> = pending
				.iter()
				.copied()
				.filter(|p| p.navigation_pose == *batch_nav)
				.collect();
			candidates.sort_by(|a, b| {
				let (pa, pb) =
					(puts_by_id[a.bottle_id.as_str()], puts_by_id[b.bottle_id.as_str()]);
				dest_nav_count[pb.navigation_pose.as_str()]
					.cmp(&dest_nav_count[pa.navigation_pose.as_str()])
					.then(
						dest_pose_count[pb.release_pose.as_str()]
							.cmp(&dest_pose_count[pa.release_pose.as_str()]),
					)
					.then(a.bottle_id.cmp(&b.bottle_id))
			});

			// fill the platform from this waypoint, admitting only bottles
			// whose destination can still take them
			let mut probe_platform = platform.clone();
			let mut probe_slots = slots.clone();
			for pickup in candidates {
				if probe_platform.free_for(pickup.object_type) == 0 {
					continue;
				}

				let put = puts_by_id[pickup.bottle_id.as_str()];
				match probe_slots.admit(&put.release_pose, put.object_type) {
					| Ok(()) => {
						probe_platform.reserve(pickup.object_type);
						batch.push(pickup.clone());
					},
					| Err(mut rejected) => {
						rejected.bottle_id = pickup.bottle_id.clone();
						plan.rejected.push(rejected);
						dropped.push(pickup.bottle_id.clone());
					},
				}
			}

			if !batch.is_empty() || !dropped.is_empty() {
				break;
			}
		}

		if batch.is_empty() && dropped.is_empty() {
			// every remaining family is saturated on the platform; with the
			// puts draining each batch this cannot recover
			for pickup in pending.drain(..) {
				plan.rejected.push(Rejected {
					bottle_id: pickup.bottle_id.clone(),
					code: Code::PlatformFull,
					reason: format!("no back-platform slot for {}", pickup.object_type),
				});
			}
			break;
		}

		pending.retain(|p| {
			!dropped.contains(&p.bottle_id)
				&& !batch.iter().any(|b| b.bottle_id == p.bottle_id)
		});

		if batch.is_empty() {
			continue;
		}

		let pickup_plan = plan_pickup(&batch, platform);
		let mut on_platform: Vec<(PutRequest, ObjectType, String)> = Vec::new();
		for leg in &pickup_plan.legs {
			for planned in &leg.bottles {
				let put = puts_by_id[planned.request.bottle_id.as_str()];
				on_platform.push((
					(*put).clone(),
					planned.request.object_type,
					planned.platform_pose.clone(),
				));
			}
		}
		plan.rejected.extend(pickup_plan.rejected);
		plan.legs.extend(pickup_plan.legs.into_iter().map(TransferLeg::Pickup));

		let put_requests: Vec<PutRequest> = on_platform.iter().map(|(p, ..)| p.clone()).collect();
		let put_plan = plan_put(&put_requests, slots);
		plan.rejected.extend(put_plan.rejected);
		plan.legs.extend(put_plan.legs.into_iter().map(TransferLeg::Put));

		// the platform drains as the puts execute
		for (_, object_type, platform_pose) in &on_platform {
			platform.release(*object_type, platform_pose);
		}
	}

	plan
}
