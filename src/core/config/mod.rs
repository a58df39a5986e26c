mod check;

use std::{
	net::{IpAddr, Ipv4Addr},
	path::{Path, PathBuf},
	time::Duration,
};

use figment::providers::{Env, Format, Toml};
pub use figment::Figment;
use serde::Deserialize;
use url::Url;

pub use self::check::check;
use crate::{
	err,
	model::{Hand, ObjectType, SlotCategory},
	Result,
};

/// All the config options for the workcell orchestrator.
///
/// Loaded from a TOML file (`--config`, or `WORKCELL_CONFIG`) merged with
/// `WORKCELL_`-prefixed environment variables. Unknown keys are rejected so
/// a typo'd option cannot silently fall back to a default.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	/// The address the HTTP command ingress listens on.
	#[serde(default = "default_address")]
	pub address: IpAddr,

	/// The port the HTTP command ingress listens on.
	#[serde(default = "default_port")]
	pub port: u16,

	/// Tracing filter directives, e.g. "info" or "workcell=debug,info".
	#[serde(default = "default_log")]
	pub log: String,

	/// Append-only per-run log file. Unset disables the file sink.
	pub log_path: Option<PathBuf>,

	/// Single-instance lock. A second orchestrator racing the same robots
	/// refuses to start while this file is held.
	#[serde(default = "default_pid_file")]
	pub pid_file: PathBuf,

	/// The robots this orchestrator drives. The first entry is the primary
	/// executor for queued tasks.
	#[serde(default)]
	pub robots: Vec<RobotConfig>,

	/// Default per-primitive reply timeout, seconds. Commands may override
	/// per request.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: u64,

	/// Delay between robot reconnect attempts, seconds.
	#[serde(default = "default_retry_interval")]
	pub retry_interval: u64,

	/// Reconnect attempt budget. Unset retries forever.
	pub max_retry_attempts: Option<u32>,

	/// Scan-station poses used by the SCAN_QRCODE workflow.
	#[serde(default)]
	pub scan: ScanConfig,

	/// Every storage slot in the cell. The default layout models the
	/// standard cell: two shelves, the on-robot back platform, the scan
	/// table with detect-temp poses, and the split station.
	#[serde(default = "default_layout")]
	pub layout: Vec<SlotConfig>,

	/// Bottles known at startup and where they sit. Inventory is
	/// rebuilt from scratch on every boot; there is no persistence.
	#[serde(default)]
	pub bottles: Vec<BottleConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
	pub name: String,

	/// WebSocket endpoint, e.g. "ws://10.0.3.7:9090".
	pub url: Url,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
	/// Waypoint in front of the scan table.
	#[serde(default = "default_scan_nav")]
	pub navigation_pose: String,

	/// Waypoint in front of the split station where scanned bottles are
	/// finally put down.
	#[serde(default = "default_split_nav")]
	pub split_navigation_pose: String,

	/// Where the scan gun rests.
	#[serde(default = "default_gun_pose")]
	pub gun_pose: String,

	/// Hand holding the scan gun for the whole session.
	#[serde(default = "default_gun_hand")]
	pub gun_hand: Hand,

	/// Hand used to move bottles while the gun is held. The tag is
	/// forwarded verbatim like every other hand value.
	#[serde(default = "default_bottle_hand")]
	pub bottle_hand: Hand,
}

impl Default for ScanConfig {
	fn default() -> Self {
		Self {
			navigation_pose: default_scan_nav(),
			split_navigation_pose: default_split_nav(),
			gun_pose: default_gun_pose(),
			gun_hand: default_gun_hand(),
			bottle_hand: default_bottle_hand(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotConfig {
	pub pose_name: String,
	pub category: SlotCategory,

	/// The waypoint this slot is reachable from. Back-platform slots ride
	/// on the robot and use the reserved waypoint "robot".
	pub navigation_pose: String,

	/// Bottle family this slot accepts; unset means untyped.
	pub accepted_type: Option<ObjectType>,

	#[serde(default = "default_slot_capacity")]
	pub capacity: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BottleConfig {
	pub bottle_id: String,
	pub object_type: ObjectType,

	#[serde(default)]
	pub hand: Hand,

	/// Slot pose the bottle occupies at boot; unset leaves it unassigned.
	pub location: Option<String>,
}

impl Config {
	/// Assemble the figment from an optional CLI path, the `WORKCELL_CONFIG`
	/// environment variable, and `WORKCELL_`-prefixed overrides.
	pub fn load(path: Option<&Path>) -> Figment {
		let env = Env::var("WORKCELL_CONFIG");

		env.iter()
			.map(Toml::file)
			.chain(path.map(Toml::file))
			.fold(Figment::new(), |config, file| config.merge(file))
			.merge(Env::prefixed("WORKCELL_").global().split("__"))
	}

	pub fn new(raw: &Figment) -> Result<Self> {
		let config: Self = raw
			.extract()
			.map_err(|e| err!(Config("{e}")))?;

		check(&config)?;
		Ok(config)
	}

	#[must_use]
	pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout) }

	#[must_use]
	pub fn retry_interval(&self) -> Duration { Duration::from_secs(self.retry_interval) }
}

fn default_address() -> IpAddr { IpAddr::V4(Ipv4Addr::LOCALHOST) }

fn default_port() -> u16 { 8080 }

fn default_log() -> String { "info".to_owned() }

fn default_pid_file() -> PathBuf { PathBuf::from("/tmp/workcell.pid") }

fn default_request_timeout() -> u64 { 10 }

fn default_retry_interval() -> u64 { 5 }

fn default_slot_capacity() -> usize { 1 }

fn default_scan_nav() -> String { "scan_table".to_owned() }

fn default_split_nav() -> String { "split_table".to_owned() }

fn default_gun_pose() -> String { "scan_gun_holder".to_owned() }

fn default_gun_hand() -> Hand { Hand::Right }

fn default_bottle_hand() -> Hand { Hand::Left }

/// The navigation pose naming storage that rides on the robot itself.
pub const ROBOT_NAV: &str = "robot";

fn default_layout() -> Vec<SlotConfig> {
	let mut layout = Vec::new();

	// two shelves, one typed slot pair per family
	for shelf in ["shelf_a", "shelf_b"] {
		for t in ObjectType::ALL {
			layout.push(SlotConfig {
				pose_name: format!("{shelf}_{}_001", t.short()),
				category: SlotCategory::Shelf,
				navigation_pose: shelf.to_owned(),
				accepted_type: Some(t),
				capacity: 2,
			});
		}
	}

	// back platform: one typed slot per family, two bottles each
	for t in ObjectType::ALL {
		layout.push(SlotConfig {
			pose_name: format!("back_temp_{}_001", t.short()),
			category: SlotCategory::BackPlatform,
			navigation_pose: ROBOT_NAV.to_owned(),
			accepted_type: Some(t),
			capacity: 2,
		});
	}

	// detect-temp poses on the scan table, untyped, one bottle each
	for n in 1..=4 {
		layout.push(SlotConfig {
			pose_name: format!("detect_temp_{n:03}"),
			category: SlotCategory::DetectTemp,
			navigation_pose: default_scan_nav(),
			accepted_type: None,
			capacity: 1,
		});
	}

	// split station
	for t in ObjectType::ALL {
		layout.push(SlotConfig {
			pose_name: format!("split_{}_001", t.short()),
			category: SlotCategory::Worktable,
			navigation_pose: default_split_nav(),
			accepted_type: Some(t),
			capacity: 2,
		});
	}

	layout
}
