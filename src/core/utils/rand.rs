use rand::{thread_rng, Rng};

pub fn string(length: usize) -> String {
	thread_rng()
		.sample_iter(&rand::distributions::Alphanumeric)
		.take(length)
		.map(char::from)
		.collect()
}

/// Task identifiers as handed out by the task engine.
#[must_use]
pub fn task_id() -> String { format!("task_{}", string(12)) }
