//! Robot connectivity: one [`Link`] per configured robot.

mod link;
mod primitives;
mod proto;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
pub use {
	link::Link,
	primitives::{Detection, SafePose, ARM_SERVICE, NAVIGATION_SERVICE},
};
use workcell::{Result, Server};

pub struct Service {
	links: Vec<Arc<Link>>,
}

impl Service {
	pub fn build(server: &Arc<Server>) -> Result<Arc<Self>> {
		let links = server
			.config
			.robots
			.iter()
			.map(|robot| Link::new(server.clone(), &robot.name, robot.url.clone()))
			.collect();

		Ok(Arc::new(Self { links }))
	}

	/// Establish the initial link to every robot, honoring the configured
	/// retry budget. Exhausting the budget is fatal at startup.
	pub async fn start(&self) -> Result {
		for link in &self.links {
			link.connect_with_retry().await?;
		}

		info!(robots = self.links.len(), "all robot links up");
		Ok(())
	}

	pub async fn stop(&self) {
		for link in &self.links {
			link.close().await;
		}
	}

	/// The robot executing queued tasks. Config order decides; the single
	/// task worker keeps its operations serialized.
	#[must_use]
	pub fn primary(&self) -> Arc<Link> {
		self.links
			.first()
			.cloned()
			.expect("config check guarantees at least one robot")
	}

	#[must_use]
	pub fn status(&self) -> Value {
		Value::Array(self.links.iter().map(|l| l.status()).collect())
	}
}
