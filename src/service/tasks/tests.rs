#![cfg(test)]

use std::sync::Arc;

use serde_json::json;
use workcell::{cmd::Envelope, error::Code, model::ObjectType};

use super::{Service, TaskStatus};
use crate::{inventory, robot, test};

fn engine() -> Arc<Service> {
	let server = test::server();
	let inventory = inventory::Service::build(&server).expect("inventory builds");
	let robot = robot::Service::build(&server).expect("robot service builds");
	Service::build(&server, &inventory, &robot).expect("task engine builds")
}

fn envelope(cmd_type: &str) -> Envelope {
	serde_json::from_value(json!({
		"cmd_id": "cmd-1",
		"cmd_type": cmd_type,
		"params": {},
	}))
	.expect("valid envelope")
}

#[test]
fn submit_creates_a_pending_record() {
	let engine = engine();

	let (task_id, queue_size) = engine.submit(envelope("SCAN_QRCODE")).unwrap();
	assert_eq!(queue_size, 1);

	let record = engine.status(&task_id).unwrap();
	assert_eq!(record.status, TaskStatus::Pending);
	assert_eq!(record.cmd_type, "SCAN_QRCODE");
	assert!(record.start_time.is_none());

	let queue = engine.queue_status();
	assert_eq!(queue["total_tasks"], 1);
	assert_eq!(queue["queue_size"], 1);
}

#[test]
fn status_of_unknown_task_is_4000() {
	let engine = engine();
	assert_eq!(engine.status("task_missing").unwrap_err().code(), Code::TaskNotFound);
}

#[test]
fn status_is_a_snapshot() {
	let engine = engine();
	let (task_id, _) = engine.submit(envelope("SCAN_QRCODE")).unwrap();

	let snapshot = engine.status(&task_id).unwrap();
	engine.set_step(&task_id, "CV_DETECTING");

	assert!(snapshot.current_step.is_none(), "snapshot must not track later mutations");
	assert_eq!(
		engine.status(&task_id).unwrap().current_step.as_deref(),
		Some("CV_DETECTING")
	);
}

#[test]
fn enter_id_without_a_waiting_task_is_4002() {
	let engine = engine();
	let err = engine.enter_id("BTL-9", ObjectType::Glass500).unwrap_err();
	assert_eq!(err.code(), Code::NoWaitingTask);
}

#[tokio::test]
async fn enter_id_rendezvous() {
	let engine = engine();
	let (task_id, _) = engine.submit(envelope("SCAN_QRCODE")).unwrap();

	let gate = engine.wait_for_enter_id(
		&task_id,
		ObjectType::Glass500,
		json!({"target_pose": "detect_temp_001", "type": "glass_bottle_500"}),
	);

	let record = engine.status(&task_id).unwrap();
	assert_eq!(record.status, TaskStatus::Waiting);
	assert_eq!(record.current_bottle_info.as_ref().unwrap()["type"], "glass_bottle_500");

	// a mismatched type bounces and leaves the task WAITING
	let err = engine.enter_id("BTL-9", ObjectType::Glass1000).unwrap_err();
	assert_eq!(err.code(), Code::EnterIdMismatch);
	assert_eq!(engine.status(&task_id).unwrap().status, TaskStatus::Waiting);

	engine.enter_id("BTL-9", ObjectType::Glass500).unwrap();
	assert_eq!(gate.await.unwrap(), "BTL-9");

	// the gate is consumed: a second ENTER_ID has nobody to talk to
	let err = engine.enter_id("BTL-10", ObjectType::Glass500).unwrap_err();
	assert_eq!(err.code(), Code::NoWaitingTask);

	engine.resume_running(&task_id);
	assert_eq!(engine.status(&task_id).unwrap().status, TaskStatus::Running);
}

#[tokio::test]
async fn cancel_drops_the_gate_of_a_waiting_task() {
	let engine = engine();
	let (task_id, _) = engine.submit(envelope("SCAN_QRCODE")).unwrap();

	let gate = engine.wait_for_enter_id(&task_id, ObjectType::Glass500, json!({}));
	engine.cancel(&task_id).unwrap();

	assert!(gate.await.is_err(), "cancellation wakes the parked session");
	assert!(engine.is_cancelled(&task_id));
}

#[test]
fn cancel_lifecycle_and_terminal_immutability() {
	let engine = engine();
	assert_eq!(engine.cancel("task_missing").unwrap_err().code(), Code::TaskNotFound);

	let (task_id, _) = engine.submit(envelope("PICK_UP")).unwrap();
	engine.cancel(&task_id).unwrap();
	assert!(engine.is_cancelled(&task_id));

	engine.begin(&task_id);
	engine.finish(&task_id, Ok(json!({"success": false})));

	let record = engine.status(&task_id).unwrap();
	assert_eq!(record.status, TaskStatus::Cancelled);
	assert!(record.end_time.is_some());

	// terminal records reject further cancels and ignore mutation
	assert_eq!(engine.cancel(&task_id).unwrap_err().code(), Code::TaskTerminal);
	engine.set_step(&task_id, "navigate:shelf_a");
	assert_eq!(engine.status(&task_id).unwrap().current_step, None);
}

#[test]
fn finish_completed_updates_counters() {
	let engine = engine();
	let (task_id, _) = engine.submit(envelope("PICK_UP")).unwrap();

	engine.begin(&task_id);
	engine.finish(&task_id, Ok(json!({"success": true, "success_count": 2})));

	let record = engine.status(&task_id).unwrap();
	assert_eq!(record.status, TaskStatus::Completed);
	assert_eq!(record.result.as_ref().unwrap()["success_count"], 2);

	let queue = engine.queue_status();
	assert_eq!(queue["completed_tasks"], 1);
	assert_eq!(queue["failed_tasks"], 0);
	assert_eq!(queue["running_task"], serde_json::Value::Null);
}

#[test]
fn finish_failed_records_the_error_text() {
	let engine = engine();
	let (task_id, _) = engine.submit(envelope("PICK_UP")).unwrap();

	engine.begin(&task_id);
	engine.finish(&task_id, Err(workcell::Error::Disconnected("r2 is down".into())));

	let record = engine.status(&task_id).unwrap();
	assert_eq!(record.status, TaskStatus::Failed);
	assert!(record.error_message.as_deref().unwrap().contains("r2 is down"));
	assert_eq!(engine.queue_status()["failed_tasks"], 1);
}
