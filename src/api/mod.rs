extern crate workcell_core as workcell;

mod command;
pub mod router;
mod status;

use std::sync::Arc;

use workcell_service::Services;

/// Shared state behind every route.
pub type State = Arc<Services>;
