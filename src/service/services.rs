use std::sync::Arc;

use tracing::{debug, info};
use workcell::{Result, Server};

use crate::{inventory, robot, tasks};

pub struct Services {
	pub inventory: Arc<inventory::Service>,
	pub robot: Arc<robot::Service>,
	pub tasks: Arc<tasks::Service>,
	pub server: Arc<Server>,
}

impl Services {
	pub async fn build(server: Arc<Server>) -> Result<Arc<Self>> {
		let inventory = inventory::Service::build(&server)?;
		let robot = robot::Service::build(&server)?;
		let tasks = tasks::Service::build(&server, &inventory, &robot)?;

		Ok(Arc::new(Self {
			inventory,
			robot,
			tasks,
			server,
		}))
	}

	/// Bring the robot links up (fatal on an exhausted retry budget) and
	/// start the task worker.
	pub async fn start(self: &Arc<Self>) -> Result<Arc<Self>> {
		debug!("Starting services...");

		self.robot.start().await?;
		self.tasks.start().await;

		info!("Services started");
		Ok(Arc::clone(self))
	}

	pub async fn stop(&self) {
		debug!("Stopping services...");

		self.tasks.stop().await;
		self.robot.stop().await;

		info!("Services stopped");
	}
}
