pub mod cmd;
pub mod config;
pub mod error;
pub mod model;
pub mod result;
pub mod server;
pub mod utils;
pub mod version;

pub use ::tracing;
pub use config::Config;
pub use error::{Code, Error};
pub use result::Result;
pub use server::Server;
pub use version::version;
