use url::Url;



pub type CameraId = u64;
pub type UserId = String;
pub type CameraList = Vec<Camera>;

#[derive(Clone)]
#[derive(Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct Camera {
	pub id: CameraId,
	pub name: String,
	#[serde(default)]
	pub location: String,
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct CameraAccessGrant {
	pub user_id: UserId,
	pub camera_id: CameraId,
	#[serde(default)]
	pub favorite: bool,
}

#[derive(Clone)]
#[derive(Debug)]
pub struct Principal {
	pub id: UserId,
	pub token: String,
}

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum StreamAction {
	Start,
	Stop,
}

impl StreamAction {
	pub fn path_segment(&self) -> &'static str {
		match self {
			StreamAction::Start => "start",
			StreamAction::Stop => "stop",
		}
	}
}

#[derive(Debug)]
pub struct StreamCommand<'a> {
	pub action: StreamAction,
	pub camera_id: CameraId,
	pub token: &'a str,
}

impl<'a> StreamCommand<'a> {
	pub fn new(action: StreamAction, camera_id: CameraId, token: &'a str) -> Self {
		StreamCommand { action, camera_id, token }
	}

	pub fn url(&self, base: &Url) -> Result<Url, url::ParseError> {
		join_path(base, &format!("{}/{}", self.action.path_segment(), self.camera_id))
	}
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct StreamUrlResult {
	pub stream_url: String,
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct StopAck {
	pub status: String,
	pub camera_id: CameraId,
}

impl StopAck {
	pub fn stopped(camera_id: CameraId) -> Self {
		StopAck { status: "stopped".to_string(), camera_id }
	}
}

pub fn playlist_url(base: &Url, camera_id: CameraId) -> Result<Url, url::ParseError> {
	join_path(base, &format!("streams/camera_{camera_id}/index.m3u8"))
}

// Url::join drops the last path segment of the base unless it ends in '/'.
fn join_path(base: &Url, relative: &str) -> Result<Url, url::ParseError> {
	if base.path().ends_with('/') {
		base.join(relative)
	} else {
		let mut with_slash = base.clone();
		with_slash.set_path(&format!("{}/", base.path()));
		with_slash.join(relative)
	}
}
