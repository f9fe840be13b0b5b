use std::sync::Arc;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::serde::json::{json, Json, Value};
use rocket::{Request, Response, State};

use log::error;

use crate::auth::{cached_failure, TokenValidator};
use crate::catalog::{CameraService, FavoriteChange, UserCameraService};
use crate::common::{Camera, CameraAccessGrant, CameraId, CameraList, Principal, StopAck, StreamUrlResult};
use crate::error::ApiError;
use crate::proxy::StreamSessionProxy;



pub type Grants = Arc<dyn UserCameraService>;
pub type Cameras = Arc<dyn CameraService>;


#[get("/start/<camera_id>")]
async fn start_stream(camera_id: CameraId, principal: Principal, proxy: &State<StreamSessionProxy>) -> Result<Json<StreamUrlResult>, ApiError> {
	proxy.start_stream(camera_id, &principal).await.map(Json)
}

#[get("/stop/<camera_id>")]
async fn stop_stream(camera_id: CameraId, principal: Principal, proxy: &State<StreamSessionProxy>) -> Result<Json<StopAck>, ApiError> {
	proxy.stop_stream(camera_id, &principal).await.map(Json)
}



#[get("/")]
async fn list_cameras(principal: Principal, grants: &State<Grants>, cameras: &State<Cameras>) -> Result<Json<CameraList>, ApiError> {
	let grants = user_grants(grants, &principal).await?;
	let list = resolve_cameras(cameras, grants.iter()).await?;
	if list.is_empty() {
		return Err(ApiError::UserCamerasNotFound);
	}
	Ok(Json(list))
}

#[get("/favorites")]
async fn list_favorites(principal: Principal, grants: &State<Grants>, cameras: &State<Cameras>) -> Result<Json<CameraList>, ApiError> {
	let grants = user_grants(grants, &principal).await?;
	let list = resolve_cameras(cameras, grants.iter().filter(|grant| grant.favorite)).await?;
	if list.is_empty() {
		return Err(ApiError::UserFavoriteCamerasNotFound);
	}
	Ok(Json(list))
}

#[get("/<id>")]
async fn get_camera(id: CameraId, principal: Principal, proxy: &State<StreamSessionProxy>) -> Result<Json<Camera>, ApiError> {
	let (_, camera) = proxy.authorize(id, &principal).await?;
	Ok(Json(camera))
}

#[post("/<id>/favorite")]
async fn add_favorite(id: CameraId, principal: Principal, proxy: &State<StreamSessionProxy>, grants: &State<Grants>) -> Result<Json<Camera>, ApiError> {
	let (_, camera) = proxy.authorize(id, &principal).await?;
	match update_favorite(grants, &principal, id, true).await? {
		FavoriteChange::Unchanged(_) => Err(ApiError::AlreadyFavorite),
		_ => Ok(Json(camera)),
	}
}

#[delete("/<id>/favorite")]
async fn remove_favorite(id: CameraId, principal: Principal, proxy: &State<StreamSessionProxy>, grants: &State<Grants>) -> Result<Json<Camera>, ApiError> {
	let (_, camera) = proxy.authorize(id, &principal).await?;
	update_favorite(grants, &principal, id, false).await?;
	Ok(Json(camera))
}

async fn user_grants(grants: &Grants, principal: &Principal) -> Result<Vec<CameraAccessGrant>, ApiError> {
	grants.grants_for_user(&principal.id).await.map_err(|err| {
		error!("Listing grants failed; error was {:#}", err);
		ApiError::Unexpected
	})
}

// Grants pointing at cameras that no longer exist are skipped.
async fn resolve_cameras<'a, I>(cameras: &Cameras, grants: I) -> Result<CameraList, ApiError>
where
	I: Iterator<Item = &'a CameraAccessGrant>,
{
	let mut list = CameraList::new();
	for grant in grants {
		let camera = cameras.find_camera(grant.camera_id).await.map_err(|err| {
			error!("Camera lookup failed; error was {:#}", err);
			ApiError::Unexpected
		})?;
		list.extend(camera);
	}
	Ok(list)
}

async fn update_favorite(grants: &Grants, principal: &Principal, id: CameraId, favorite: bool) -> Result<FavoriteChange, ApiError> {
	match grants.set_favorite(&principal.id, id, favorite).await {
		Ok(FavoriteChange::NoGrant) => Err(ApiError::CameraAccessNotFound),
		Ok(change) => Ok(change),
		Err(err) => {
			error!("Updating favorite failed; error was {:#}", err);
			Err(ApiError::Unexpected)
		}
	}
}



#[catch(401)]
fn unauthorized(request: &Request) -> Value {
	cached_failure(request).unwrap_or(ApiError::TokenAbsent).body()
}

#[catch(404)]
fn not_found() -> Value {
	json!({ "detail": "resource was not found" })
}

#[catch(422)]
fn unprocessable() -> Value {
	json!({ "detail": "request could not be processed" })
}

#[catch(default)]
fn unknown(status: Status, _request: &Request) -> (Status, Value) {
	(status, ApiError::Unexpected.body())
}



// The web UI is served by another server, so it needs CORS to reach this one.
pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
	fn info(&self) -> Info {
		Info {
			name: "Add CORS headers to responses",
			kind: Kind::Response
		}
	}

	async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
		response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
		response.set_header(Header::new("Access-Control-Allow-Methods", "POST, GET, DELETE, OPTIONS"));
		response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
		response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
	}
}


pub fn stage(proxy: StreamSessionProxy, grants: Grants, cameras: Cameras, tokens: TokenValidator) -> rocket::fairing::AdHoc {
	rocket::fairing::AdHoc::on_ignite("Stream gateway", move |rocket| async move {
		rocket
			.manage(proxy)
			.manage(grants)
			.manage(cameras)
			.manage(tokens)
			.register("/", catchers![unauthorized, not_found, unprocessable, unknown])
			.mount("/stream", routes![start_stream, stop_stream])
			.mount("/cameras", routes![list_cameras, list_favorites, get_camera, add_favorite, remove_favorite])
	})
}



#[cfg(test)]
mod tests {
	use super::*;

	use rocket::local::asynchronous::Client;
	use url::Url;

	use crate::auth::tests::{settings as auth_settings, token_for};
	use crate::config::{StopFailurePolicy, StreamerSettings};
	use crate::proxy::tests::{catalog, HOST};
	use crate::streamer::tests::RecordingTransport;
	use crate::streamer::TransportError;

	async fn client_with(transport: Arc<RecordingTransport>, policy: StopFailurePolicy) -> Client {
		let mut settings = StreamerSettings::new(Url::parse(HOST).unwrap());
		settings.stop_failure = policy;
		let catalog = catalog();
		let proxy = StreamSessionProxy::new(settings, catalog.clone(), catalog.clone(), transport);
		let rocket = rocket::build().attach(stage(
			proxy,
			catalog.clone(),
			catalog,
			TokenValidator::new(&auth_settings()),
		)).attach(CORS);
		Client::tracked(rocket).await.unwrap()
	}

	fn bearer(user: &str) -> Header<'static> {
		Header::new("Authorization", format!("Bearer {}", token_for(user, 600)))
	}

	#[rocket::async_test]
	async fn start_returns_stream_url() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport.clone(), StopFailurePolicy::Swallow).await;

		let token = token_for("42", 600);
		let response = client.get("/stream/start/7")
			.header(Header::new("Authorization", format!("Bearer {}", token)))
			.dispatch()
			.await;
		assert_eq!(response.status(), Status::Ok);
		let body: Value = response.into_json().await.unwrap();
		assert_eq!(body, json!({ "stream_url": "http://gin.local:8080/streams/camera_7/index.m3u8" }));

		let calls = transport.calls();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].url, "http://gin.local:8080/start/7");
		assert_eq!(calls[0].token, token);
	}

	#[rocket::async_test]
	async fn upstream_503_passes_through_on_start() {
		let transport = Arc::new(RecordingTransport::replying(Ok(503)));
		let client = client_with(transport, StopFailurePolicy::Swallow).await;

		let response = client.get("/stream/start/7").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::ServiceUnavailable);
		let body: Value = response.into_json().await.unwrap();
		assert_eq!(body, json!({ "detail": "failed to start stream" }));
	}

	#[rocket::async_test]
	async fn upstream_503_is_hidden_on_stop() {
		let transport = Arc::new(RecordingTransport::replying(Ok(503)));
		let client = client_with(transport.clone(), StopFailurePolicy::Swallow).await;

		let response = client.get("/stream/stop/7").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		assert_eq!(transport.calls().len(), 1);
	}

	#[rocket::async_test]
	async fn upstream_503_on_stop_when_propagating() {
		let transport = Arc::new(RecordingTransport::replying(Ok(503)));
		let client = client_with(transport, StopFailurePolicy::Propagate).await;

		let response = client.get("/stream/stop/7").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::ServiceUnavailable);
		let body: Value = response.into_json().await.unwrap();
		assert_eq!(body, json!({ "detail": "failed to stop stream" }));
	}

	#[rocket::async_test]
	async fn start_timeout_is_gateway_timeout() {
		let transport = Arc::new(RecordingTransport::replying(Err(TransportError::Timeout)));
		let client = client_with(transport, StopFailurePolicy::Swallow).await;

		let response = client.get("/stream/start/7").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::GatewayTimeout);
	}

	#[rocket::async_test]
	async fn stranger_gets_404_without_outbound_call() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport.clone(), StopFailurePolicy::Swallow).await;

		for uri in ["/stream/start/7", "/stream/stop/7"] {
			let response = client.get(uri).header(bearer("43")).dispatch().await;
			assert_eq!(response.status(), Status::NotFound);
			let body: Value = response.into_json().await.unwrap();
			assert_eq!(body, json!({ "detail": "camera with this id was not found" }));
		}
		assert!(transport.calls().is_empty());
	}

	#[rocket::async_test]
	async fn missing_token_is_rejected() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport.clone(), StopFailurePolicy::Swallow).await;

		let response = client.get("/stream/start/7").dispatch().await;
		assert_eq!(response.status(), Status::Unauthorized);
		let body: Value = response.into_json().await.unwrap();
		assert_eq!(body, json!({ "detail": "token is missing" }));

		let expired = Header::new("Authorization", format!("Bearer {}", token_for("42", -600)));
		let response = client.get("/stream/start/7").header(expired).dispatch().await;
		assert_eq!(response.status(), Status::Unauthorized);
		let body: Value = response.into_json().await.unwrap();
		assert_eq!(body, json!({ "detail": "token has expired" }));

		assert!(transport.calls().is_empty());
	}

	#[rocket::async_test]
	async fn camera_listing_and_favorites() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport, StopFailurePolicy::Swallow).await;

		let response = client.get("/cameras").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let cameras: CameraList = response.into_json().await.unwrap();
		assert_eq!(cameras.iter().map(|camera| camera.id).collect::<Vec<_>>(), vec![7]);

		let response = client.get("/cameras").header(bearer("43")).dispatch().await;
		assert_eq!(response.status(), Status::NotFound);

		let response = client.get("/cameras/favorites").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::NotFound);

		let response = client.post("/cameras/7/favorite").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let response = client.post("/cameras/7/favorite").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::Conflict);

		let response = client.get("/cameras/favorites").header(bearer("42")).dispatch().await;
		let favorites: CameraList = response.into_json().await.unwrap();
		assert_eq!(favorites.len(), 1);

		let response = client.delete("/cameras/7/favorite").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let response = client.get("/cameras/favorites").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::NotFound);
	}

	#[rocket::async_test]
	async fn single_camera() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport, StopFailurePolicy::Swallow).await;

		let response = client.get("/cameras/7").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		let camera: Camera = response.into_json().await.unwrap();
		assert_eq!(camera.name, "Gate");

		let response = client.get("/cameras/9").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::NotFound);
		let body: Value = response.into_json().await.unwrap();
		assert_eq!(body, json!({ "detail": "camera with this id was not found or access is denied" }));
	}

	#[rocket::async_test]
	async fn malformed_camera_id_is_unprocessable() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport.clone(), StopFailurePolicy::Swallow).await;

		for uri in ["/stream/start/abc", "/stream/start/-1"] {
			let response = client.get(uri).header(bearer("42")).dispatch().await;
			assert_eq!(response.status(), Status::UnprocessableEntity);
			let body: Value = response.into_json().await.unwrap();
			assert_eq!(body, json!({ "detail": "request could not be processed" }));
		}
		assert!(transport.calls().is_empty());
	}

	#[rocket::async_test]
	async fn unknown_route_is_json_404() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport, StopFailurePolicy::Swallow).await;

		let response = client.get("/nope").dispatch().await;
		assert_eq!(response.status(), Status::NotFound);
		let body: Value = response.into_json().await.unwrap();
		assert_eq!(body, json!({ "detail": "resource was not found" }));
	}

	#[rocket::async_test]
	async fn responses_carry_cors_headers() {
		let transport = Arc::new(RecordingTransport::replying(Ok(200)));
		let client = client_with(transport, StopFailurePolicy::Swallow).await;

		let response = client.get("/stream/start/7").header(bearer("42")).dispatch().await;
		assert_eq!(response.status(), Status::Ok);
		assert_eq!(response.headers().get_one("Access-Control-Allow-Origin"), Some("*"));
		assert_eq!(response.headers().get_one("Access-Control-Allow-Credentials"), Some("true"));

		// error responses too
		let response = client.get("/nope").dispatch().await;
		assert_eq!(response.headers().get_one("Access-Control-Allow-Origin"), Some("*"));
	}
}
