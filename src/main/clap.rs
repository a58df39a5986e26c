//! Integration with `clap`

use std::path::PathBuf;

use clap::Parser;
use workcell::version;

/// Commandline arguments
#[derive(Parser, Debug)]
#[clap(version = version(), about, long_about = None)]
pub(crate) struct Args {
	/// Path to a workcell config TOML file
	#[arg(short, long, env = "WORKCELL_CONFIG")]
	pub(crate) config: Option<PathBuf>,

	/// Validate the configuration and exit
	#[arg(long)]
	pub(crate) check_config: bool,
}

/// Parse commandline arguments into structured data
#[must_use]
pub(crate) fn parse() -> Args { Args::parse() }
