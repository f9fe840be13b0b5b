use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::debug;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::State;

use crate::common::Principal;
use crate::config::AuthSettings;
use crate::error::ApiError;



#[derive(Debug)]
#[derive(Deserialize)]
struct Claims {
	#[serde(default)]
	sub: Option<String>,
}

pub struct TokenValidator {
	key: DecodingKey,
	validation: Validation,
}

impl TokenValidator {
	pub fn new(settings: &AuthSettings) -> Self {
		let mut validation = Validation::new(settings.algorithm);
		validation.leeway = 0;
		TokenValidator {
			key: DecodingKey::from_secret(settings.secret_key.as_bytes()),
			validation,
		}
	}

	pub fn current_user(&self, token: &str) -> Result<String, ApiError> {
		let data = decode::<Claims>(token, &self.key, &self.validation)
			.map_err(|err| match err.kind() {
				JwtErrorKind::ExpiredSignature => ApiError::TokenExpired,
				_ => ApiError::IncorrectTokenFormat,
			})?;
		match data.claims.sub {
			Some(sub) if !sub.is_empty() => Ok(sub),
			_ => Err(ApiError::UserIsNotPresent),
		}
	}
}

pub fn bearer_token(header: Option<&str>) -> Result<&str, ApiError> {
	let value = header.ok_or(ApiError::TokenAbsent)?;
	let (scheme, token) = value.split_once(' ').ok_or(ApiError::TokenAbsent)?;
	let token = token.trim();
	if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
		return Err(ApiError::TokenAbsent);
	}
	Ok(token)
}

pub fn cached_failure(request: &Request<'_>) -> Option<ApiError> {
	*request.local_cache(|| None::<ApiError>)
}

fn fail(request: &Request<'_>, err: ApiError) -> Outcome<Principal, ApiError> {
	debug!("Rejected request to {}: {}", request.uri(), err);
	request.local_cache(|| Some(err));
	Outcome::Error((Status::Unauthorized, err))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
	type Error = ApiError;

	async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
		let validator = match request.guard::<&State<TokenValidator>>().await {
			Outcome::Success(validator) => validator,
			_ => return Outcome::Error((Status::InternalServerError, ApiError::Unexpected)),
		};

		let token = match bearer_token(request.headers().get_one("Authorization")) {
			Ok(token) => token,
			Err(err) => return fail(request, err),
		};

		match validator.current_user(token) {
			Ok(id) => Outcome::Success(Principal { id, token: token.to_string() }),
			Err(err) => fail(request, err),
		}
	}
}
