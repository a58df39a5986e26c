use std::time::Duration;

use axum::Router;
use tower_http::{
	catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use workcell_api::State;

/// Outermost layers run first: panics become 500s, slow exchanges are cut,
/// every request is traced.
pub(crate) fn apply(router: Router<State>) -> Router<State> {
	router
		.layer(TraceLayer::new_for_http())
		.layer(TimeoutLayer::new(Duration::from_secs(60)))
		.layer(CatchPanicLayer::new())
}
