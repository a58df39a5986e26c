//! Authoritative bottle/slot ledger for the cell.
//!
//! One mutex over the whole state; every public method locks briefly and
//! returns owned snapshots. Callers never observe a half-applied mutation.
//! Reservations are ephemeral holds that count against slot capacity until
//! committed or cancelled, so two tasks cannot promise the same space.


use std::{
	collections::BTreeMap,
	sync::{Arc, Mutex},
};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use workcell::{
	err,
	model::{Hand, ObjectType, SlotCategory},
	utils, Result, Server,
};

pub struct Service {
	server: Arc<Server>,
	state: Mutex<State>,
}

#[derive(Default)]
struct State {
	bottles: BTreeMap<String, Bottle>,
	slots: BTreeMap<String, Slot>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Bottle {
	pub bottle_id: String,
	pub object_type: ObjectType,
	pub hand: Hand,
	pub location: Option<String>,
	pub scanned_at: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Slot {
	pub pose_name: String,
	pub category: SlotCategory,
	pub navigation_pose: String,
	pub accepted_type: Option<ObjectType>,
	pub capacity: usize,
	pub occupants: Vec<String>,

	#[serde(skip)]
	reserved: Vec<String>,
}

impl Slot {
	/// Capacity not spoken for by occupants or live reservations.
	#[must_use]
	pub fn free(&self) -> usize {
		self.capacity
			.saturating_sub(self.occupants.len())
			.saturating_sub(self.reserved.len())
	}

	#[must_use]
	pub fn is_full(&self) -> bool { self.free() == 0 }

	fn accepts(&self, object_type: ObjectType) -> bool {
		self.accepted_type.is_none_or(|t| t == object_type)
	}
}

/// An ephemeral capacity hold. Consumed by [`Service::commit_place`] or
/// released by [`Service::cancel_reservation`]; dropping one without either
/// leaks the hold until process end, so handlers must bracket carefully.
#[derive(Debug)]
pub struct Reservation {
	pub pose_name: String,
	pub holder: String,
}

/// Remaining space per back-platform slot, keyed for the planner's
/// simulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotView {
	pub pose_name: String,
	pub navigation_pose: String,
	pub accepted_type: Option<ObjectType>,
	pub free: usize,
}

#[derive(Clone, Debug, Default)]
pub struct SummaryFilter {
	pub bottle_id: Option<String>,
	pub pose_name: Option<String>,
	pub detail: bool,
}

impl Service {
	pub fn build(server: &Arc<Server>) -> Result<Arc<Self>> {
		let mut state = State::default();

		for slot in &server.config.layout {
			state.slots.insert(slot.pose_name.clone(), Slot {
				pose_name: slot.pose_name.clone(),
				category: slot.category,
				navigation_pose: slot.navigation_pose.clone(),
				accepted_type: slot.accepted_type,
				capacity: slot.capacity,
				occupants: Vec::new(),
				reserved: Vec::new(),
			});
		}

		for bottle in &server.config.bottles {
			if let Some(location) = &bottle.location {
				let slot = state
					.slots
					.get_mut(location)
					.ok_or_else(|| err!(Config("seed bottle {} slot {location} missing", bottle.bottle_id)))?;
				slot.occupants.push(bottle.bottle_id.clone());
			}

			state.bottles.insert(bottle.bottle_id.clone(), Bottle {
				bottle_id: bottle.bottle_id.clone(),
				object_type: bottle.object_type,
				hand: bottle.hand,
				location: bottle.location.clone(),
				scanned_at: None,
			});
		}

		info!(
			slots = state.slots.len(),
			bottles = state.bottles.len(),
			"inventory seeded from layout"
		);

		Ok(Arc::new(Self {
			server: server.clone(),
			state: Mutex::new(state),
		}))
	}

	pub fn lookup_bottle(&self, bottle_id: &str) -> Result<Bottle> {
		self.state
			.lock()
			.expect("inventory mutex poisoned")
			.bottles
			.get(bottle_id)
			.cloned()
			.ok_or_else(|| err!(BottleNotFound("{bottle_id}")))
	}

	pub fn lookup_slot(&self, pose_name: &str) -> Result<Slot> {
		self.state
			.lock()
			.expect("inventory mutex poisoned")
			.slots
			.get(pose_name)
			.cloned()
			.ok_or_else(|| err!(SlotNotFound("{pose_name}")))
	}

	#[must_use]
	pub fn slots_by_navigation(&self, navigation_pose: &str) -> Vec<Slot> {
		self.state
			.lock()
			.expect("inventory mutex poisoned")
			.slots
			.values()
			.filter(|s| s.navigation_pose == navigation_pose)
			.cloned()
			.collect()
	}

	#[must_use]
	pub fn slots_by_category(&self, category: SlotCategory) -> Vec<Slot> {
		self.state
			.lock()
			.expect("inventory mutex poisoned")
			.slots
			.values()
			.filter(|s| s.category == category)
			.cloned()
			.collect()
	}

	/// Capacity snapshot of the robot's back platform, one view per typed
	/// slot, ordered by pose name for deterministic planning.
	#[must_use]
	pub fn back_platform_view(&self) -> Vec<SlotView> {
		self.slots_by_category(SlotCategory::BackPlatform)
			.into_iter()
			.map(|s| SlotView {
				free: s.free(),
				pose_name: s.pose_name,
				navigation_pose: s.navigation_pose,
				accepted_type: s.accepted_type,
			})
			.collect()
	}

	pub fn slot_view(&self, pose_name: &str) -> Result<SlotView> {
		let slot = self.lookup_slot(pose_name)?;
		Ok(SlotView {
			free: slot.free(),
			pose_name: slot.pose_name,
			navigation_pose: slot.navigation_pose,
			accepted_type: slot.accepted_type,
		})
	}

	/// Place a hold on `pose_name` for `holder`. The holder string is the
	/// bottle_id where one is known; scan sessions hold under their task id
	/// until ENTER_ID names the bottle.
	pub fn reserve_slot(
		&self,
		pose_name: &str,
		holder: &str,
		object_type: ObjectType,
	) -> Result<Reservation> {
		let mut state = self.state.lock().expect("inventory mutex poisoned");
		let slot = state
			.slots
			.get_mut(pose_name)
			.ok_or_else(|| err!(SlotNotFound("{pose_name}")))?;

		if !slot.accepts(object_type) {
			return Err(err!(TypeMismatch("{object_type} not accepted by {pose_name}")));
		}

		if slot.free() == 0 {
			return Err(err!(SlotFull("{pose_name}")));
		}

		slot.reserved.push(holder.to_owned());
		debug!(pose_name, holder, "slot reserved");

		Ok(Reservation {
			pose_name: pose_name.to_owned(),
			holder: holder.to_owned(),
		})
	}

	pub fn cancel_reservation(&self, reservation: Reservation) {
		let mut state = self.state.lock().expect("inventory mutex poisoned");
		if let Some(slot) = state.slots.get_mut(&reservation.pose_name) {
			if let Some(pos) = slot.reserved.iter().position(|h| *h == reservation.holder) {
				slot.reserved.remove(pos);
			}
		}

		debug!(pose_name = %reservation.pose_name, holder = %reservation.holder, "reservation released");
	}

	/// Consume a reservation, placing `bottle_id` into the reserved slot.
	/// Detaches the bottle from any slot that previously listed it, keeping
	/// the one-slot-per-bottle invariant.
	pub fn commit_place(&self, reservation: Reservation, bottle_id: &str) -> Result {
		let mut state = self.state.lock().expect("inventory mutex poisoned");

		if !state.bottles.contains_key(bottle_id) {
			return Err(err!(BottleNotFound("{bottle_id}")));
		}

		let previous = state
			.bottles
			.get(bottle_id)
			.and_then(|b| b.location.clone());
		if let Some(previous) = previous {
			if let Some(old) = state.slots.get_mut(&previous) {
				old.occupants.retain(|b| b != bottle_id);
			}
		}

		let slot = state
			.slots
			.get_mut(&reservation.pose_name)
			.ok_or_else(|| err!(SlotNotFound("{}", reservation.pose_name)))?;

		let Some(pos) = slot.reserved.iter().position(|h| *h == reservation.holder) else {
			return Err(err!("reservation for {} is not live", reservation.pose_name));
		};
		slot.reserved.remove(pos);
		slot.occupants.push(bottle_id.to_owned());

		let pose_name = reservation.pose_name;
		let bottle = state
			.bottles
			.get_mut(bottle_id)
			.expect("bottle presence checked above");
		bottle.location = Some(pose_name.clone());

		debug!(bottle_id, pose_name = %pose_name, "bottle placed");
		Ok(())
	}

	pub fn commit_remove(&self, pose_name: &str, bottle_id: &str) -> Result {
		let mut state = self.state.lock().expect("inventory mutex poisoned");

		let slot = state
			.slots
			.get_mut(pose_name)
			.ok_or_else(|| err!(SlotNotFound("{pose_name}")))?;

		let Some(pos) = slot.occupants.iter().position(|b| b == bottle_id) else {
			return Err(err!(BottleNotFound("{bottle_id} not in {pose_name}")));
		};
		slot.occupants.remove(pos);

		if let Some(bottle) = state.bottles.get_mut(bottle_id) {
			bottle.location = None;
		}

		debug!(bottle_id, pose_name, "bottle removed");
		Ok(())
	}

	/// Upsert used by ENTER_ID when an operator names a freshly scanned
	/// bottle. Re-entering a known bottle with a different family is a
	/// request error; the physical object cannot have changed size.
	pub fn bind_bottle(&self, bottle_id: &str, object_type: ObjectType, hand: Hand) -> Result {
		let mut state = self.state.lock().expect("inventory mutex poisoned");

		if let Some(existing) = state.bottles.get_mut(bottle_id) {
			if existing.object_type != object_type {
				return Err(err!(BadRequest(
					"bottle {bottle_id} is registered as {}, not {object_type}",
					existing.object_type
				)));
			}

			existing.scanned_at = Some(utils::millis_since_unix_epoch());
			return Ok(());
		}

		state.bottles.insert(bottle_id.to_owned(), Bottle {
			bottle_id: bottle_id.to_owned(),
			object_type,
			hand,
			location: None,
			scanned_at: Some(utils::millis_since_unix_epoch()),
		});

		Ok(())
	}

	/// JSON projection for BOTTLE_GET. Side-effect free.
	#[must_use]
	pub fn summary(&self, filter: &SummaryFilter) -> Value {
		let state = self.state.lock().expect("inventory mutex poisoned");

		let bottles: Vec<Value> = state
			.bottles
			.values()
			.filter(|b| filter.bottle_id.as_deref().is_none_or(|id| id == b.bottle_id))
			.filter(|b| {
				filter
					.pose_name
					.as_deref()
					.is_none_or(|pose| b.location.as_deref() == Some(pose))
			})
			.map(|b| {
				if filter.detail {
					json!({
						"bottle_id": b.bottle_id,
						"object_type": b.object_type,
						"hand": b.hand,
						"location": b.location,
						"scanned_at": b.scanned_at,
					})
				} else {
					json!({"bottle_id": b.bottle_id, "location": b.location})
				}
			})
			.collect();

		let slots: Vec<Value> = state
			.slots
			.values()
			.filter(|s| filter.pose_name.as_deref().is_none_or(|pose| pose == s.pose_name))
			.filter(|s| {
				filter
					.bottle_id
					.as_deref()
					.is_none_or(|id| s.occupants.iter().any(|b| b == id))
			})
			.map(|s| {
				if filter.detail {
					json!({
						"pose_name": s.pose_name,
						"category": s.category,
						"navigation_pose": s.navigation_pose,
						"accepted_type": s.accepted_type,
						"capacity": s.capacity,
						"occupants": s.occupants,
					})
				} else {
					json!({"pose_name": s.pose_name, "occupants": s.occupants})
				}
			})
			.collect();

		json!({"bottles": bottles, "slots": slots})
	}

	/// Scan-station poses from config; the scan workflow reads these
	/// through inventory so nothing else needs the raw config.
	#[must_use]
	pub fn scan_config(&self) -> &workcell::config::ScanConfig { &self.server.config.scan }
}
