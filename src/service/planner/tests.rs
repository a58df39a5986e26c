#![cfg(test)]

use workcell::{
	error::Code,
	model::{Hand, ObjectType},
};

use super::{plan_pickup, plan_put, plan_transfer, PlatformSim, SlotSim, TransferLeg};
use crate::inventory::SlotView;

fn platform_view() -> Vec<SlotView> {
	ObjectType::ALL
		.into_iter()
		.map(|t| SlotView {
			pose_name: format!("back_temp_{}_001", t.short()),
			navigation_pose: "robot".to_owned(),
			accepted_type: Some(t),
			free: 2,
		})
		.collect()
}

fn pickup(id: &str, t: ObjectType, nav: &str) -> super::PickupRequest {
	super::PickupRequest {
		bottle_id: id.to_owned(),
		object_type: t,
		navigation_pose: nav.to_owned(),
		target_pose: format!("{nav}_{}_001", t.short()),
		hand: Hand::Right,
	}
}

fn put(id: &str, t: ObjectType, pose: &str, nav: &str) -> super::PutRequest {
	super::PutRequest {
		bottle_id: id.to_owned(),
		object_type: t,
		release_pose: pose.to_owned(),
		navigation_pose: nav.to_owned(),
		hand: Hand::Right,
	}
}

fn release_view(pose: &str, nav: &str, t: ObjectType, free: usize) -> SlotView {
	SlotView {
		pose_name: pose.to_owned(),
		navigation_pose: nav.to_owned(),
		accepted_type: Some(t),
		free,
	}
}

#[test]
fn two_bottles_same_nav_is_one_leg() {
	let mut platform = PlatformSim::new(&platform_view());
	let requests = vec![
		pickup("B1", ObjectType::Glass1000, "shelf"),
		pickup("B2", ObjectType::Glass500, "shelf"),
	];

	let plan = plan_pickup(&requests, &mut platform);

	assert!(plan.rejected.is_empty());
	assert_eq!(plan.legs.len(), 1);
	assert_eq!(plan.legs[0].navigation_pose, "shelf");

	let bottles = &plan.legs[0].bottles;
	assert_eq!(bottles.len(), 2);
	assert_eq!(bottles[0].request.bottle_id, "B1");
	assert_eq!(bottles[0].platform_pose, "back_temp_1000_001");
	assert_eq!(bottles[1].request.bottle_id, "B2");
	assert_eq!(bottles[1].platform_pose, "back_temp_500_001");
}

#[test]
fn overflow_rejects_with_platform_full() {
	let mut platform = PlatformSim::new(&platform_view());
	let requests: Vec<_> = (1..=9)
		.map(|n| pickup(&format!("B{n}"), ObjectType::Glass1000, "shelf_a"))
		.collect();

	let plan = plan_pickup(&requests, &mut platform);

	let planned: usize = plan.legs.iter().map(|l| l.bottles.len()).sum();
	assert_eq!(planned, 2);
	assert_eq!(plan.rejected.len(), 7);
	assert!(plan.rejected.iter().all(|r| r.code == Code::PlatformFull));
}

#[test]
fn exactly_one_over_capacity_rejects_exactly_that_bottle() {
	let mut platform = PlatformSim::new(&platform_view());
	let requests = vec![
		pickup("B1", ObjectType::Glass1000, "shelf_a"),
		pickup("B2", ObjectType::Glass1000, "shelf_a"),
		pickup("B3", ObjectType::Glass1000, "shelf_a"),
	];

	let plan = plan_pickup(&requests, &mut platform);

	assert_eq!(plan.rejected.len(), 1);
	assert_eq!(plan.rejected[0].bottle_id, "B3");
	assert_eq!(plan.rejected[0].code, Code::PlatformFull);
}

#[test]
fn legs_equal_distinct_navs_and_big_groups_go_first() {
	let mut platform = PlatformSim::new(&platform_view());
	let requests = vec![
		pickup("B1", ObjectType::Glass1000, "shelf_b"),
		pickup("B2", ObjectType::Glass500, "shelf_a"),
		pickup("B3", ObjectType::Glass250, "shelf_a"),
		pickup("B4", ObjectType::Glass100, "shelf_c"),
	];

	let plan = plan_pickup(&requests, &mut platform);

	let navs: Vec<&str> = plan.legs.iter().map(|l| l.navigation_pose.as_str()).collect();
	assert_eq!(navs, vec!["shelf_a", "shelf_b", "shelf_c"]);
}

#[test]
fn plans_are_deterministic() {
	let requests = vec![
		pickup("B3", ObjectType::Glass500, "shelf_b"),
		pickup("B1", ObjectType::Glass1000, "shelf_a"),
		pickup("B2", ObjectType::Glass1000, "shelf_b"),
	];

	let a = plan_pickup(&requests, &mut PlatformSim::new(&platform_view()));
	let b = plan_pickup(&requests, &mut PlatformSim::new(&platform_view()));

	assert_eq!(format!("{a:?}"), format!("{b:?}"));
}

#[test]
fn put_rejects_full_and_mismatched_slots() {
	let mut slots = SlotSim::new([
		release_view("split_1000_001", "split_table", ObjectType::Glass1000, 1),
		release_view("split_500_001", "split_table", ObjectType::Glass500, 0),
	]);

	let requests = vec![
		put("B1", ObjectType::Glass1000, "split_1000_001", "split_table"),
		put("B2", ObjectType::Glass500, "split_500_001", "split_table"),
		put("B3", ObjectType::Glass500, "split_1000_001", "split_table"),
	];

	let plan = plan_put(&requests, &mut slots);

	assert_eq!(plan.legs.len(), 1);
	assert_eq!(plan.legs[0].bottles.len(), 1);
	assert_eq!(plan.legs[0].bottles[0].bottle_id, "B1");

	let codes: Vec<(String, Code)> = plan
		.rejected
		.iter()
		.map(|r| (r.bottle_id.clone(), r.code))
		.collect();
	assert!(codes.contains(&("B2".to_owned(), Code::SlotFull)));
	assert!(codes.contains(&("B3".to_owned(), Code::TypeMismatch)));
}

#[test]
fn transfer_batches_by_source_and_alternates() {
	// B1: src_a -> dst_a, B2: src_a -> dst_b, B3: src_b -> dst_a; the two
	// release poses share the split_east waypoint
	let pickups = vec![
		pickup("B1", ObjectType::Glass1000, "src_a"),
		pickup("B2", ObjectType::Glass500, "src_a"),
		pickup("B3", ObjectType::Glass1000, "src_b"),
	];
	let puts = vec![
		put("B1", ObjectType::Glass1000, "dst_a", "split_east"),
		put("B2", ObjectType::Glass500, "dst_b", "split_east"),
		put("B3", ObjectType::Glass1000, "dst_a", "split_east"),
	];
	let mut platform = PlatformSim::new(&platform_view());
	let mut slots = SlotSim::new([
		release_view("dst_a", "split_east", ObjectType::Glass1000, 2),
		release_view("dst_b", "split_east", ObjectType::Glass500, 2),
	]);

	let plan = plan_transfer(&pickups, &puts, &mut platform, &mut slots);
	assert!(plan.rejected.is_empty());

	// four legs total: pickup src_a, put, pickup src_b, put
	assert_eq!(plan.legs.len(), 4);

	match &plan.legs[0] {
		| TransferLeg::Pickup(leg) => {
			assert_eq!(leg.navigation_pose, "src_a");
			let ids: Vec<&str> = leg.bottles.iter().map(|b| b.request.bottle_id.as_str()).collect();
			assert_eq!(ids, vec!["B1", "B2"]);
		},
		| TransferLeg::Put(_) => panic!("expected a pickup leg first"),
	}

	match &plan.legs[1] {
		| TransferLeg::Put(leg) => {
			assert_eq!(leg.navigation_pose, "split_east");
			let targets: Vec<(&str, &str)> = leg
				.bottles
				.iter()
				.map(|b| (b.bottle_id.as_str(), b.release_pose.as_str()))
				.collect();
			assert_eq!(targets, vec![("B1", "dst_a"), ("B2", "dst_b")]);
		},
		| TransferLeg::Pickup(_) => panic!("expected a put leg second"),
	}

	match &plan.legs[2] {
		| TransferLeg::Pickup(leg) => {
			assert_eq!(leg.navigation_pose, "src_b");
			assert_eq!(leg.bottles[0].request.bottle_id, "B3");
		},
		| TransferLeg::Put(_) => panic!("expected a pickup leg third"),
	}

	match &plan.legs[3] {
		| TransferLeg::Put(leg) => {
			assert_eq!(leg.bottles[0].release_pose, "dst_a");
		},
		| TransferLeg::Pickup(_) => panic!("expected a put leg fourth"),
	}
}

#[test]
fn transfer_platform_capacity_forces_extra_batches() {
	// four same-family bottles from one shelf through a two-slot platform
	let pickups: Vec<_> = (1..=4)
		.map(|n| pickup(&format!("B{n}"), ObjectType::Glass1000, "src_a"))
		.collect();
	let puts: Vec<_> = (1..=4)
		.map(|n| put(&format!("B{n}"), ObjectType::Glass1000, "dst_a", "split_east"))
		.collect();
	let mut platform = PlatformSim::new(&platform_view());
	let mut slots = SlotSim::new([release_view("dst_a", "split_east", ObjectType::Glass1000, 4)]);

	let plan = plan_transfer(&pickups, &puts, &mut platform, &mut slots);

	assert!(plan.rejected.is_empty());
	let pickup_legs = plan
		.legs
		.iter()
		.filter(|l| matches!(l, TransferLeg::Pickup(_)))
		.count();
	assert_eq!(pickup_legs, 2, "two bottles per batch through the platform");
}

#[test]
fn transfer_rejects_unreleasable_bottles_up_front() {
	let pickups = vec![
		pickup("B1", ObjectType::Glass1000, "src_a"),
		pickup("B2", ObjectType::Glass500, "src_a"),
	];
	let puts = vec![
		put("B1", ObjectType::Glass1000, "dst_a", "split_east"),
		put("B2", ObjectType::Glass500, "dst_full", "split_east"),
	];
	let mut platform = PlatformSim::new(&platform_view());
	let mut slots = SlotSim::new([
		release_view("dst_a", "split_east", ObjectType::Glass1000, 2),
		release_view("dst_full", "split_east", ObjectType::Glass500, 0),
	]);

	let plan = plan_transfer(&pickups, &puts, &mut platform, &mut slots);

	assert_eq!(plan.rejected.len(), 1);
	assert_eq!(plan.rejected[0].bottle_id, "B2");
	assert_eq!(plan.rejected[0].code, Code::SlotFull);

	let planned: Vec<&str> = plan
		.legs
		.iter()
		.filter_map(|l| match l {
			| TransferLeg::Pickup(leg) =>
				Some(leg.bottles.iter().map(|b| b.request.bottle_id.as_str())),
			| TransferLeg::Put(_) => None,
		})
		.flatten()
		.collect();
	assert_eq!(planned, vec!["B1"]);
}
