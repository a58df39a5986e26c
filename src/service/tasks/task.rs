use serde::Serialize;
use serde_json::Value;
use workcell::utils;

/// Task lifecycle. Terminal states are never left and their records are
/// never mutated again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
	Pending,
	Running,
	Waiting,
	Completed,
	Failed,
	Cancelled,
}

impl TaskStatus {
	#[must_use]
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskRecord {
	pub task_id: String,
	pub cmd_id: String,
	pub cmd_type: String,
	pub status: TaskStatus,

	pub submit_time: u64,
	pub start_time: Option<u64>,
	pub end_time: Option<u64>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub current_step: Option<String>,

	pub completed_steps: Vec<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,

	/// The detection a scan session is currently processing; what an
	/// operator answers ENTER_ID against.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub current_bottle_info: Option<Value>,

	#[serde(skip)]
	pub(super) cancel_requested: bool,
}

impl TaskRecord {
	pub(super) fn new(task_id: String, cmd_id: String, cmd_type: String) -> Self {
		Self {
			task_id,
			cmd_id,
			cmd_type,
			status: TaskStatus::Pending,
			submit_time: utils::millis_since_unix_epoch(),
			start_time: None,
			end_time: None,
			result: None,
			current_step: None,
			completed_steps: Vec::new(),
			error_message: None,
			current_bottle_info: None,
			cancel_requested: false,
		}
	}
}
