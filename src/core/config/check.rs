use std::collections::{BTreeMap, BTreeSet};

use crate::{Err, Result};

use super::{Config, ROBOT_NAV};

/// Structural validation beyond what serde can express. Failures here abort
/// startup with the configuration exit code.
pub fn check(config: &Config) -> Result {
	if config.port == 0 {
		return Err!(Config("port must be nonzero"));
	}

	if config.robots.is_empty() {
		return Err!(Config("at least one [[robots]] entry is required"));
	}

	let mut names = BTreeSet::new();
	for robot in &config.robots {
		if !names.insert(robot.name.as_str()) {
			return Err!(Config("duplicate robot name: {}", robot.name));
		}

		match robot.url.scheme() {
			| "ws" | "wss" => {},
			| scheme => {
				return Err!(Config(
					"robot {} url scheme must be ws or wss, not {scheme}",
					robot.name
				));
			},
		}
	}

	if config.layout.is_empty() {
		return Err!(Config("layout must define at least one slot"));
	}

	let mut poses = BTreeMap::new();
	for slot in &config.layout {
		if poses.insert(slot.pose_name.as_str(), slot).is_some() {
			return Err!(Config("duplicate slot pose_name: {}", slot.pose_name));
		}

		if slot.capacity == 0 {
			return Err!(Config("slot {} capacity must be at least 1", slot.pose_name));
		}

		let on_robot = slot.navigation_pose == ROBOT_NAV;
		if on_robot != slot.category.on_robot() {
			return Err!(Config(
				"slot {}: navigation_pose \"{ROBOT_NAV}\" is reserved for back_platform slots",
				slot.pose_name
			));
		}

		if slot.category.on_robot() && slot.accepted_type.is_none() {
			return Err!(Config(
				"back-platform slot {} must declare an accepted_type",
				slot.pose_name
			));
		}
	}

	let mut seen = BTreeSet::new();
	let mut seeded: BTreeMap<&str, usize> = BTreeMap::new();
	for bottle in &config.bottles {
		if !seen.insert(bottle.bottle_id.as_str()) {
			return Err!(Config("duplicate seed bottle_id: {}", bottle.bottle_id));
		}

		let Some(location) = bottle.location.as_deref() else {
			continue;
		};

		let Some(slot) = poses.get(location) else {
			return Err!(Config(
				"bottle {} is seeded into unknown slot {location}",
				bottle.bottle_id
			));
		};

		if slot.accepted_type.is_some_and(|t| t != bottle.object_type) {
			return Err!(Config(
				"bottle {} ({}) does not fit slot {location}",
				bottle.bottle_id,
				bottle.object_type
			));
		}

		let count = seeded.entry(location).or_default();
		*count = count.saturating_add(1);
		if *count > slot.capacity {
			return Err!(Config("slot {location} is seeded beyond its capacity"));
		}
	}

	Ok(())
}
