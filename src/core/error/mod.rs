mod err;
mod response;

use std::{fmt, time::Duration};

/// Unified wire error codes. Every error leaving the orchestrator over HTTP
/// carries exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Code {
	Ok = 0,
	BadRequest = 1000,
	UnknownCmdType = 1001,
	BottleNotFound = 2000,
	SlotNotFound = 2001,
	SlotFull = 2002,
	TypeMismatch = 2003,
	PlatformFull = 2004,
	Disconnected = 3000,
	PrimitiveTimeout = 3001,
	RemoteError = 3002,
	TaskNotFound = 4000,
	TaskTerminal = 4001,
	NoWaitingTask = 4002,
	EnterIdMismatch = 4003,
	Internal = 5000,
}

impl Code {
	#[inline]
	#[must_use]
	pub fn u16(self) -> u16 { self as u16 }
}

#[derive(thiserror::Error)]
pub enum Error {
	// request stratum
	#[error("{0}")]
	BadRequest(String),
	#[error("unknown cmd_type: {0}")]
	UnknownCmdType(String),

	// inventory stratum
	#[error("unknown bottle: {0}")]
	BottleNotFound(String),
	#[error("unknown slot: {0}")]
	SlotNotFound(String),
	#[error("slot is full: {0}")]
	SlotFull(String),
	#[error("bottle type not accepted by slot: {0}")]
	TypeMismatch(String),
	#[error("no free back-platform slot for type: {0}")]
	PlatformFull(String),

	// robot stratum
	#[error("robot link down: {0}")]
	Disconnected(String),
	#[error("robot did not reply within {0:?}")]
	PrimitiveTimeout(Duration),
	#[error("robot rejected {action}: {message}")]
	RemoteError { action: String, message: String },

	// task stratum
	#[error("unknown task: {0}")]
	TaskNotFound(String),
	#[error("task already reached a terminal status: {0}")]
	TaskTerminal(String),
	#[error("no scan task is waiting for an id")]
	NoWaitingTask,
	#[error("entered type does not match the detected bottle")]
	EnterIdMismatch,

	// process lifecycle; these never reach the wire table
	#[error("configuration error: {0}")]
	Config(String),
	#[error("another instance holds the lock file: {0}")]
	LockHeld(String),
	#[error("robot link could not be established: {0}")]
	RobotInit(String),

	// std
	#[error("{0}")]
	Fmt(#[from] fmt::Error),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("{0}")]
	Utf8Error(#[from] std::str::Utf8Error),

	// third-party
	#[error("{0}")]
	SerdeJson(#[from] serde_json::Error),
	#[error("{0}")]
	Figment(#[from] figment::Error),
	#[error("{0}")]
	Url(#[from] url::ParseError),
	#[error("Join error: {0}")]
	JoinError(#[from] tokio::task::JoinError),

	// unique / untyped
	#[error("{0}")]
	Err(String),
}

impl Error {
	/// The unified wire code for this error.
	#[must_use]
	pub fn code(&self) -> Code {
		match self {
			| Self::BadRequest(_) => Code::BadRequest,
			| Self::UnknownCmdType(_) => Code::UnknownCmdType,
			| Self::BottleNotFound(_) => Code::BottleNotFound,
			| Self::SlotNotFound(_) => Code::SlotNotFound,
			| Self::SlotFull(_) => Code::SlotFull,
			| Self::TypeMismatch(_) => Code::TypeMismatch,
			| Self::PlatformFull(_) => Code::PlatformFull,
			| Self::Disconnected(_) => Code::Disconnected,
			| Self::PrimitiveTimeout(_) => Code::PrimitiveTimeout,
			| Self::RemoteError { .. } => Code::RemoteError,
			| Self::TaskNotFound(_) => Code::TaskNotFound,
			| Self::TaskTerminal(_) => Code::TaskTerminal,
			| Self::NoWaitingTask => Code::NoWaitingTask,
			| Self::EnterIdMismatch => Code::EnterIdMismatch,
			| _ => Code::Internal,
		}
	}

	#[must_use]
	pub fn status_code(&self) -> http::StatusCode {
		use http::StatusCode;

		match self.code() {
			| Code::Ok => StatusCode::OK,
			| Code::BadRequest | Code::UnknownCmdType | Code::EnterIdMismatch => StatusCode::BAD_REQUEST,
			| Code::BottleNotFound
			| Code::SlotNotFound
			| Code::TaskNotFound
			| Code::NoWaitingTask => StatusCode::NOT_FOUND,
			| Code::SlotFull | Code::TypeMismatch | Code::PlatformFull | Code::TaskTerminal =>
				StatusCode::CONFLICT,
			| Code::Disconnected | Code::RemoteError => StatusCode::BAD_GATEWAY,
			| Code::PrimitiveTimeout => StatusCode::GATEWAY_TIMEOUT,
			| Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Process exit code when this error aborts startup.
	#[must_use]
	pub fn exit_code(&self) -> u8 {
		match self {
			| Self::LockHeld(_) => 1,
			| Self::Config(_) | Self::Figment(_) => 2,
			| Self::RobotInit(_) => 3,
			| _ => 1,
		}
	}

	/// Human text recorded in task records and HTTP envelopes.
	#[must_use]
	pub fn message(&self) -> String { self.to_string() }
}

impl fmt::Debug for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{self}") }
}

#[cfg(test)]
mod tests {
	use super::{Code, Error};

	#[test]
	fn wire_codes_match_table() {
		assert_eq!(Code::Ok.u16(), 0);
		assert_eq!(Error::BadRequest("x".into()).code().u16(), 1000);
		assert_eq!(Error::UnknownCmdType("x".into()).code().u16(), 1001);
		assert_eq!(Error::BottleNotFound("b".into()).code().u16(), 2000);
		assert_eq!(Error::SlotNotFound("s".into()).code().u16(), 2001);
		assert_eq!(Error::SlotFull("s".into()).code().u16(), 2002);
		assert_eq!(Error::TypeMismatch("s".into()).code().u16(), 2003);
		assert_eq!(Error::PlatformFull("t".into()).code().u16(), 2004);
		assert_eq!(Error::Disconnected("r".into()).code().u16(), 3000);
		assert_eq!(Error::NoWaitingTask.code().u16(), 4002);
		assert_eq!(Error::EnterIdMismatch.code().u16(), 4003);
		assert_eq!(Error::Err("x".into()).code().u16(), 5000);
	}

	#[test]
	fn exit_codes() {
		assert_eq!(Error::LockHeld("f".into()).exit_code(), 1);
		assert_eq!(Error::Config("c".into()).exit_code(), 2);
		assert_eq!(Error::RobotInit("r".into()).exit_code(), 3);
	}
}
