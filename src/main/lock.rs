//! Single-instance pid-file lock.
//!
//! Two orchestrators racing the same robots is a physical hazard; the
//! second process refuses to start with the lock-held exit code. A lock
//! left by a dead process is reclaimed.

use std::{
	fs,
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};

use tracing::{info, warn};
use workcell::{err, Result};

pub(crate) struct Guard {
	path: PathBuf,
}

impl Drop for Guard {
	fn drop(&mut self) {
		if let Err(e) = fs::remove_file(&self.path) {
			warn!(path = %self.path.display(), "releasing lock file failed: {e}");
		}
	}
}

pub(crate) fn acquire(path: &Path) -> Result<Guard> {
	for attempt in 0..2 {
		match fs::OpenOptions::new().write(true).create_new(true).open(path) {
			| Ok(mut file) => {
				writeln!(file, "{}", std::process::id())?;
				info!(path = %path.display(), "instance lock acquired");
				return Ok(Guard { path: path.to_owned() });
			},
			| Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt == 0 => {
				if holder_alive(path) {
					break;
				}

				warn!(path = %path.display(), "reclaiming stale lock file");
				fs::remove_file(path)?;
			},
			| Err(e) if e.kind() == ErrorKind::AlreadyExists => break,
			| Err(e) => return Err(e.into()),
		}
	}

	Err(err!(LockHeld("{}", path.display())))
}

#[cfg(unix)]
fn holder_alive(path: &Path) -> bool {
	let Some(pid) = fs::read_to_string(path)
		.ok()
		.and_then(|s| s.trim().parse::<u32>().ok())
	else {
		// unreadable lock content; assume the holder lives
		return true;
	};

	Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(unix))]
fn holder_alive(_path: &Path) -> bool { true }
