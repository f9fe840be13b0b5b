use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::{json, Json, Value};



// Status codes live in `status` and messages in the #[error] attributes; nowhere else.
#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
#[derive(thiserror::Error)]
pub enum ApiError {
	#[error("token is missing")]
	TokenAbsent,
	#[error("token has expired")]
	TokenExpired,
	#[error("token has an invalid format")]
	IncorrectTokenFormat,
	#[error("user is not present")]
	UserIsNotPresent,
	#[error("camera with this id was not found")]
	CameraAccessNotFound,
	#[error("camera with this id was not found or access is denied")]
	CameraNotFound,
	#[error("no cameras found for this user")]
	UserCamerasNotFound,
	#[error("no favorite cameras found for this user")]
	UserFavoriteCamerasNotFound,
	#[error("camera is already in favorites")]
	AlreadyFavorite,
	#[error("failed to start stream")]
	StreamStartFailed { status: u16 },
	#[error("failed to stop stream")]
	StreamStopFailed { status: u16 },
	#[error("streaming service did not respond in time")]
	StreamerTimeout,
	#[error("streaming service is unreachable")]
	StreamerUnreachable,
	#[error("unknown error")]
	Unexpected,
}

impl ApiError {
	pub fn status(&self) -> Status {
		match *self {
			ApiError::TokenAbsent
			| ApiError::TokenExpired
			| ApiError::IncorrectTokenFormat
			| ApiError::UserIsNotPresent => Status::Unauthorized,
			ApiError::CameraAccessNotFound
			| ApiError::CameraNotFound
			| ApiError::UserCamerasNotFound
			| ApiError::UserFavoriteCamerasNotFound => Status::NotFound,
			ApiError::AlreadyFavorite => Status::Conflict,
			ApiError::StreamStartFailed { status }
			| ApiError::StreamStopFailed { status } => upstream_status(status),
			ApiError::StreamerTimeout => Status::GatewayTimeout,
			ApiError::StreamerUnreachable => Status::BadGateway,
			ApiError::Unexpected => Status::BadRequest,
		}
	}

	pub fn body(&self) -> Value {
		json!({ "detail": self.to_string() })
	}
}

// Upstream codes are passed through; anything outside the HTTP range becomes 502.
fn upstream_status(code: u16) -> Status {
	if (100..=599).contains(&code) {
		Status::new(code)
	} else {
		Status::BadGateway
	}
}

impl<'r> Responder<'r, 'static> for ApiError {
	fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
		(self.status(), Json(self.body())).respond_to(request)
	}
}
