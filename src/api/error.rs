use axum::response::{IntoResponse, Response};
use http::StatusCode;
use typing_core::Error;

/// Wraps [`typing_core::Error`] for an `axum` `IntoResponse` impl -- the
/// orphan rule blocks implementing that trait directly on a foreign type.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
	fn from(error: Error) -> Self { Self(error) }
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, errcode) = match &self.0 {
			Error::Auth(_) | Error::UnauthorizedOrigin(_) => (StatusCode::FORBIDDEN, "M_FORBIDDEN"),
			Error::MalformedEdu(_) | Error::Json(_) | Error::Mxid(_) => (StatusCode::BAD_REQUEST, "M_BAD_JSON"),
			_ => (StatusCode::INTERNAL_SERVER_ERROR, "M_UNKNOWN"),
		};

		let body = serde_json::json!({
			"errcode": errcode,
			"error": self.0.sanitized_string(),
		});

		(status, axum::Json(body)).into_response()
	}
}
