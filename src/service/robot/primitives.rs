//! Typed wrappers for the seven robot service actions.
//!
//! Navigation and waist rotation are idempotent on the robot and may be
//! retried by handlers; grab and put are not. The `hand` tag is forwarded
//! verbatim, see the vendor note on its inverted meaning.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;
use serde_json::{json, Value};
use workcell::{err, model::Hand, Result};

use super::Link;

pub const NAVIGATION_SERVICE: &str = "/navigation_status";
pub const ARM_SERVICE: &str = "/get_strawberry_service";

/// Arm posture to assume after releasing an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafePose {
	Preset,
	LiftUp,
	Retract,
}

/// One cv_detect hit on the scan table.
#[derive(Clone, Debug, Deserialize)]
pub struct Detection {
	pub target_pose: String,
	pub bottle_type: workcell::model::ObjectType,
}

impl Link {
	pub async fn waiting_navigation_status(self: &Arc<Self>, wait: Duration) -> Result {
		self.send_request(NAVIGATION_SERVICE, "waiting_navigation_status", json!({}), wait)
			.await
			.map(|_| ())
	}

	pub async fn navigation_to_pose(self: &Arc<Self>, navigation_pose: &str, wait: Duration) -> Result {
		self.send_request(
			NAVIGATION_SERVICE,
			"navigation_to_pose",
			json!({"navigation_pose": navigation_pose}),
			wait,
		)
		.await
		.map(|_| ())
	}

	pub async fn grab_object(
		self: &Arc<Self>,
		object_type: &str,
		target_pose: &str,
		hand: Hand,
		wait: Duration,
	) -> Result {
		self.send_request(
			ARM_SERVICE,
			"grab_object",
			json!({"type": object_type, "target_pose": target_pose, "hand": hand}),
			wait,
		)
		.await
		.map(|_| ())
	}

	pub async fn turn_waist(self: &Arc<Self>, angle: i64, obstacle_avoidance: bool, wait: Duration) -> Result {
		if !(-180..=180).contains(&angle) {
			return Err(err!(BadRequest("waist angle {angle} outside [-180, 180]")));
		}

		self.send_request(
			ARM_SERVICE,
			"turn_waist",
			json!({"angle": angle, "obstacle_avoidance": obstacle_avoidance}),
			wait,
		)
		.await
		.map(|_| ())
	}

	pub async fn put_object(
		self: &Arc<Self>,
		object_type: &str,
		target_pose: &str,
		hand: Hand,
		safe_pose: SafePose,
		wait: Duration,
	) -> Result {
		self.send_request(
			ARM_SERVICE,
			"put_object",
			json!({
				"type": object_type,
				"target_pose": target_pose,
				"hand": hand,
				"safe_pose": safe_pose,
			}),
			wait,
		)
		.await
		.map(|_| ())
	}

	pub async fn scan(self: &Arc<Self>, wait: Duration) -> Result {
		self.send_request(ARM_SERVICE, "scan", json!({}), wait)
			.await
			.map(|_| ())
	}

	/// One detection pass over the scan table. `Ok(None)` is the robot's
	/// no-detection answer, not an error.
	pub async fn cv_detect(self: &Arc<Self>, wait: Duration) -> Result<Option<Detection>> {
		let values = self
			.send_request(ARM_SERVICE, "cv_detect", json!({}), wait)
			.await?;

		let found = values
			.get("target_pose")
			.and_then(Value::as_str)
			.is_some_and(|pose| !pose.is_empty());
		if !found {
			return Ok(None);
		}

		Ok(Some(serde_json::from_value(values)?))
	}
}
