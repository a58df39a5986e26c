use axum::{response::IntoResponse, Json};
use serde_json::json;

use super::Error;

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let status = self.status_code();
		let body = Json(json!({
			"success": false,
			"code": self.code().u16(),
			"message": self.message(),
		}));

		(status, body).into_response()
	}
}
