use axum::{
	routing::{get, post},
	Router,
};

use crate::{command, status, State};

pub fn build() -> Router<State> {
	Router::new()
		.route("/", get(status::health).post(command::post_command))
		.route("/task/:task_id", get(status::get_task))
		.route("/queue/status", get(status::queue_status))
}
