//! Version identifier reported by the health endpoint and startup banner.

const BRANDING: &str = "workcell";
const SEMANTIC: &str = env!("CARGO_PKG_VERSION");

#[must_use]
pub fn name() -> &'static str { BRANDING }

#[must_use]
pub fn version() -> String {
	match option_env!("WORKCELL_VERSION_EXTRA") {
		| Some(extra) if !extra.is_empty() => format!("{SEMANTIC} ({extra})"),
		| _ => SEMANTIC.to_owned(),
	}
}
