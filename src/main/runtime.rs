use tokio::runtime;
use workcell::Result;

const WORKER_NAME: &str = "workcell:worker";

pub(crate) fn new() -> Result<runtime::Runtime> {
	runtime::Builder::new_multi_thread()
		.enable_io()
		.enable_time()
		.thread_name(WORKER_NAME)
		.build()
		.map_err(Into::into)
}
