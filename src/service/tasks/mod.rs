//! The asynchronous task engine: a FIFO queue, a single worker, and the
//! task registry.
//!
//! One worker drains the queue so physical robot operations never
//! interleave across tasks; completion order equals submission order.
//! Status reads are snapshots, and a record that reached a terminal status
//! is immutable from then on.

mod handlers;
mod scan;
mod task;
mod tests;

use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex,
	},
};

use serde_json::{json, Value};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, error, info};
use workcell::{cmd::Envelope, err, model::ObjectType, utils, Error, Result, Server};

pub use self::task::{TaskRecord, TaskStatus};
pub use self::handlers::validate;
use crate::{inventory, robot};

pub struct Service {
	server: Arc<Server>,
	pub(crate) inventory: Arc<inventory::Service>,
	pub(crate) robot: Arc<robot::Service>,

	registry: Mutex<BTreeMap<String, TaskRecord>>,
	sender: loole::Sender<Job>,
	receiver: loole::Receiver<Job>,

	total: AtomicU64,
	completed: AtomicU64,
	failed: AtomicU64,
	running: Mutex<Option<String>>,

	/// The ENTER_ID rendezvous: at most one scan session waits at a time
	/// (single worker), and exactly one ENTER_ID may consume the gate.
	waiting: Mutex<Option<Gate>>,

	worker_join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

struct Job {
	task_id: String,
	envelope: Envelope,
}

struct Gate {
	task_id: String,
	expected: ObjectType,
	tx: oneshot::Sender<String>,
}

impl Service {
	pub fn build(
		server: &Arc<Server>,
		inventory: &Arc<inventory::Service>,
		robot: &Arc<robot::Service>,
	) -> Result<Arc<Self>> {
		let (sender, receiver) = loole::unbounded();

		Ok(Arc::new(Self {
			server: server.clone(),
			inventory: inventory.clone(),
			robot: robot.clone(),
			registry: Mutex::new(BTreeMap::new()),
			sender,
			receiver,
			total: AtomicU64::new(0),
			completed: AtomicU64::new(0),
			failed: AtomicU64::new(0),
			running: Mutex::new(None),
			waiting: Mutex::new(None),
			worker_join: tokio::sync::Mutex::new(None),
		}))
	}

	pub async fn start(self: &Arc<Self>) {
		let service = Arc::clone(self);
		let handle = self.server.runtime().spawn(async move { service.worker().await });
		_ = self.worker_join.lock().await.insert(handle);
	}

	pub async fn stop(&self) {
		// a scan session parked on the rendezvous must be woken or the
		// worker would never drain
		*self.waiting.lock().expect("waiting mutex poisoned") = None;
		self.sender.close();

		if let Some(handle) = self.worker_join.lock().await.take() {
			_ = handle.await;
		}
	}

	#[tracing::instrument(skip_all, name = "worker")]
	async fn worker(self: Arc<Self>) {
		let mut shutdown = self.server.signal.subscribe();

		loop {
			let job = tokio::select! {
				job = self.receiver.recv_async() => match job {
					| Ok(job) => job,
					| Err(_) => break,
				},
				_ = shutdown.recv() => break,
			};

			self.begin(&job.task_id);
			let outcome = handlers::execute(&self, &job.task_id, &job.envelope).await;
			if let Err(e) = &outcome {
				error!(
					task_id = %job.task_id,
					cmd_id = %job.envelope.cmd_id,
					code = e.code().u16(),
					"task failed: {e}"
				);
			}
			self.finish(&job.task_id, outcome);
		}

		debug!("task worker stopped");
	}

	/// Queue a long-running command. Returns immediately with the new task
	/// id and the queue depth behind it.
	pub fn submit(&self, envelope: Envelope) -> Result<(String, usize)> {
		let task_id = utils::rand::task_id();
		let record = TaskRecord::new(
			task_id.clone(),
			envelope.cmd_id.clone(),
			envelope.cmd_type.clone(),
		);

		self.registry
			.lock()
			.expect("registry mutex poisoned")
			.insert(task_id.clone(), record);
		self.total.fetch_add(1, Ordering::Relaxed);

		self.sender
			.send(Job { task_id: task_id.clone(), envelope })
			.map_err(|_| err!("task queue is closed"))?;

		let queue_size = self.receiver.len();
		info!(task_id = %task_id, queue_size, "task queued");
		Ok((task_id, queue_size))
	}

	/// Deep-copy snapshot of a task record.
	pub fn status(&self, task_id: &str) -> Result<TaskRecord> {
		self.registry
			.lock()
			.expect("registry mutex poisoned")
			.get(task_id)
			.cloned()
			.ok_or_else(|| err!(TaskNotFound("{task_id}")))
	}

	#[must_use]
	pub fn queue_status(&self) -> Value {
		json!({
			"queue_size": self.receiver.len(),
			"total_tasks": self.total.load(Ordering::Relaxed),
			"completed_tasks": self.completed.load(Ordering::Relaxed),
			"failed_tasks": self.failed.load(Ordering::Relaxed),
			"running_task": *self.running.lock().expect("running mutex poisoned"),
		})
	}

	/// Request cooperative cancellation; observed at the next step
	/// boundary. A primitive already dispatched to the robot runs to
	/// completion.
	pub fn cancel(&self, task_id: &str) -> Result {
		{
			let mut registry = self.registry.lock().expect("registry mutex poisoned");
			let record = registry
				.get_mut(task_id)
				.ok_or_else(|| err!(TaskNotFound("{task_id}")))?;

			if record.status.is_terminal() {
				return Err(err!(TaskTerminal("{task_id}")));
			}

			record.cancel_requested = true;
		}

		// wake a parked scan session; the dropped gate reads as cancel
		let mut waiting = self.waiting.lock().expect("waiting mutex poisoned");
		if waiting.as_ref().is_some_and(|gate| gate.task_id == task_id) {
			*waiting = None;
		}

		info!(task_id, "cancellation requested");
		Ok(())
	}

	/// Deliver an operator-entered bottle id to the waiting scan session.
	/// A type mismatch leaves the gate armed and the task WAITING.
	pub fn enter_id(&self, bottle_id: &str, object_type: ObjectType) -> Result {
		let mut waiting = self.waiting.lock().expect("waiting mutex poisoned");

		let Some(gate) = waiting.as_ref() else {
			return Err(Error::NoWaitingTask);
		};

		if gate.expected != object_type {
			return Err(Error::EnterIdMismatch);
		}

		let gate = waiting.take().expect("gate presence checked above");
		gate.tx
			.send(bottle_id.to_owned())
			.map_err(|_| Error::NoWaitingTask)?;

		debug!(bottle_id, task_id = %gate.task_id, "enter-id delivered");
		Ok(())
	}

	pub(super) fn is_cancelled(&self, task_id: &str) -> bool {
		self.registry
			.lock()
			.expect("registry mutex poisoned")
			.get(task_id)
			.is_some_and(|r| r.cancel_requested)
	}

	/// Park the scan session: arm the gate, flip the record to WAITING and
	/// expose the pending detection. The returned receiver resolves with
	/// the entered bottle id, or errors when the gate was dropped by a
	/// cancellation.
	pub(super) fn wait_for_enter_id(
		&self,
		task_id: &str,
		expected: ObjectType,
		info: Value,
	) -> oneshot::Receiver<String> {
		let (tx, rx) = oneshot::channel();

		*self.waiting.lock().expect("waiting mutex poisoned") = Some(Gate {
			task_id: task_id.to_owned(),
			expected,
			tx,
		});

		self.with_record(task_id, |record| {
			record.status = TaskStatus::Waiting;
			record.current_bottle_info = Some(info);
		});

		rx
	}

	pub(super) fn resume_running(&self, task_id: &str) {
		*self.waiting.lock().expect("waiting mutex poisoned") = None;
		self.with_record(task_id, |record| {
			record.status = TaskStatus::Running;
			record.current_bottle_info = None;
		});
	}

	pub(super) fn set_step(&self, task_id: &str, step: &str) {
		self.with_record(task_id, |record| {
			if let Some(previous) = record.current_step.take() {
				record.completed_steps.push(previous);
			}
			record.current_step = Some(step.to_owned());
		});
	}

	fn begin(&self, task_id: &str) {
		self.with_record(task_id, |record| {
			record.status = TaskStatus::Running;
			record.start_time = Some(utils::millis_since_unix_epoch());
		});
		*self.running.lock().expect("running mutex poisoned") = Some(task_id.to_owned());
	}

	fn finish(&self, task_id: &str, outcome: Result<Value>) {
		self.with_record(task_id, |record| {
			if let Some(step) = record.current_step.take() {
				record.completed_steps.push(step);
			}
			record.current_bottle_info = None;
			record.end_time = Some(utils::millis_since_unix_epoch());

			record.status = match &outcome {
				| _ if record.cancel_requested => TaskStatus::Cancelled,
				| Ok(_) => TaskStatus::Completed,
				| Err(_) => TaskStatus::Failed,
			};

			match outcome {
				| Ok(result) => record.result = Some(result),
				| Err(e) => record.error_message = Some(e.message()),
			}
		});

		match self.status(task_id).map(|r| r.status) {
			| Ok(TaskStatus::Completed) => _ = self.completed.fetch_add(1, Ordering::Relaxed),
			| Ok(TaskStatus::Failed) => _ = self.failed.fetch_add(1, Ordering::Relaxed),
			| _ => {},
		}

		*self.running.lock().expect("running mutex poisoned") = None;
	}

	/// Apply a mutation to a live record. Terminal records are left
	/// untouched, which is what makes snapshots of finished tasks stable.
	fn with_record(&self, task_id: &str, f: impl FnOnce(&mut TaskRecord)) {
		let mut registry = self.registry.lock().expect("registry mutex poisoned");
		if let Some(record) = registry.get_mut(task_id) {
			if !record.status.is_terminal() {
				f(record);
			}
		}
	}
}
