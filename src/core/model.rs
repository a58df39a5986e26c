//! Shared workcell vocabulary: the bottle families the arm can grip, the
//! hand preference tags, and the categories of storage slots around the
//! cell. These appear in the configuration, the inventory, the command
//! params and on the robot wire, so they live here in core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The enumerated bottle family. The family decides which slots accept the
/// bottle; every typed slot in the layout names exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
	#[serde(rename = "glass_bottle_1000")]
	Glass1000,
	#[serde(rename = "glass_bottle_500")]
	Glass500,
	#[serde(rename = "glass_bottle_250")]
	Glass250,
	#[serde(rename = "glass_bottle_100")]
	Glass100,
}

impl ObjectType {
	pub const ALL: [Self; 4] = [Self::Glass1000, Self::Glass500, Self::Glass250, Self::Glass100];

	#[must_use]
	pub fn as_str(&self) -> &'static str {
		match self {
			| Self::Glass1000 => "glass_bottle_1000",
			| Self::Glass500 => "glass_bottle_500",
			| Self::Glass250 => "glass_bottle_250",
			| Self::Glass100 => "glass_bottle_100",
		}
	}

	/// Short form used in generated pose names, e.g. `back_temp_1000_001`.
	#[must_use]
	pub fn short(&self) -> &'static str {
		match self {
			| Self::Glass1000 => "1000",
			| Self::Glass500 => "500",
			| Self::Glass250 => "250",
			| Self::Glass100 => "100",
		}
	}
}

impl fmt::Display for ObjectType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for ObjectType {
	type Err = crate::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|t| t.as_str() == s)
			.ok_or_else(|| crate::err!(BadRequest("unknown object_type: {s}")))
	}
}

/// Which arm the robot should prefer for this bottle. The vendor
/// documentation notes the tag is inverted on the wire; the orchestrator
/// therefore never interprets the value, only forwards it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
	Left,
	#[default]
	Right,
	Both,
}

impl Hand {
	#[must_use]
	pub fn as_str(&self) -> &'static str {
		match self {
			| Self::Left => "left",
			| Self::Right => "right",
			| Self::Both => "both",
		}
	}
}

impl fmt::Display for Hand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Where a slot physically lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotCategory {
	/// Fixed shelving around the cell.
	Shelf,
	/// Storage on the robot itself; reachable without navigation.
	BackPlatform,
	/// Work surfaces such as the split station.
	Worktable,
	/// The scan station surface.
	ScanTable,
	/// Temporary poses where cv_detect reports unidentified bottles.
	DetectTemp,
}

impl SlotCategory {
	#[must_use]
	pub fn on_robot(&self) -> bool { matches!(self, Self::BackPlatform) }
}

#[cfg(test)]
mod tests {
	use super::{Hand, ObjectType};

	#[test]
	fn object_type_round_trip() {
		for t in ObjectType::ALL {
			let s = serde_json::to_string(&t).unwrap();
			assert_eq!(s, format!("\"{}\"", t.as_str()));
			let back: ObjectType = serde_json::from_str(&s).unwrap();
			assert_eq!(back, t);
		}
	}

	#[test]
	fn object_type_from_str_rejects_unknown() {
		assert!("plastic_bottle_1000".parse::<ObjectType>().is_err());
	}

	#[test]
	fn hand_passthrough_spelling() {
		assert_eq!(serde_json::to_string(&Hand::Left).unwrap(), "\"left\"");
		assert_eq!(serde_json::to_string(&Hand::Both).unwrap(), "\"both\"");
	}
}
