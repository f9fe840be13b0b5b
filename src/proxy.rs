use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::catalog::{CameraService, UserCameraService};
use crate::common::{playlist_url, Camera, CameraAccessGrant, CameraId, Principal, StopAck, StreamAction, StreamCommand, StreamUrlResult};
use crate::config::{StopFailurePolicy, StreamerSettings};
use crate::error::ApiError;
use crate::streamer::{StreamerTransport, TransportError};



pub struct StreamSessionProxy {
	settings: StreamerSettings,
	grants: Arc<dyn UserCameraService>,
	cameras: Arc<dyn CameraService>,
	transport: Arc<dyn StreamerTransport>,
}

impl StreamSessionProxy {
	pub fn new(
		settings: StreamerSettings,
		grants: Arc<dyn UserCameraService>,
		cameras: Arc<dyn CameraService>,
		transport: Arc<dyn StreamerTransport>,
	) -> Self {
		StreamSessionProxy { settings, grants, cameras, transport }
	}

	pub async fn start_stream(&self, camera_id: CameraId, principal: &Principal) -> Result<StreamUrlResult, ApiError> {
		self.authorize(camera_id, principal).await?;

		let command = StreamCommand::new(StreamAction::Start, camera_id, &principal.token);
		self.send(&command, self.settings.start_timeout()).await?;

		let stream_url = playlist_url(&self.settings.base_url, camera_id).map_err(|err| {
			error!("Cannot build stream URL for camera {}: {}", camera_id, err);
			ApiError::Unexpected
		})?;
		Ok(StreamUrlResult { stream_url: stream_url.to_string() })
	}

	pub async fn stop_stream(&self, camera_id: CameraId, principal: &Principal) -> Result<StopAck, ApiError> {
		self.authorize(camera_id, principal).await?;

		let command = StreamCommand::new(StreamAction::Stop, camera_id, &principal.token);
		match self.send(&command, self.settings.stop_timeout()).await {
			Ok(()) => {},
			Err(err) if self.settings.stop_failure == StopFailurePolicy::Swallow => {
				warn!("Stopping stream for camera {} failed ({}); acknowledging anyway", camera_id, err);
			},
			Err(err) => return Err(err),
		}
		Ok(StopAck::stopped(camera_id))
	}

	// grant check first, then camera existence; nothing goes out if either fails
	pub async fn authorize(&self, camera_id: CameraId, principal: &Principal) -> Result<(CameraAccessGrant, Camera), ApiError> {
		let grant = self.grants.find_grant(&principal.id, camera_id).await.map_err(|err| {
			error!("Grant lookup for camera {} failed: {:#}", camera_id, err);
			ApiError::Unexpected
		})?;
		let grant = grant.ok_or(ApiError::CameraAccessNotFound)?;

		let camera = self.cameras.find_camera(camera_id).await.map_err(|err| {
			error!("Camera lookup for camera {} failed: {:#}", camera_id, err);
			ApiError::Unexpected
		})?;
		let camera = camera.ok_or(ApiError::CameraNotFound)?;
		Ok((grant, camera))
	}

	async fn send(&self, command: &StreamCommand<'_>, timeout: Duration) -> Result<(), ApiError> {
		let url = command.url(&self.settings.base_url).map_err(|err| {
			error!("Cannot build streamer URL for camera {}: {}", command.camera_id, err);
			ApiError::Unexpected
		})?;

		let result = self.transport.post(url, command.token, timeout).await;
		match result {
			Ok(status) if (200..300).contains(&status) => {
				info!("Streamer accepted {:?} for camera {} ({})", command.action, command.camera_id, status);
				Ok(())
			},
			Ok(status) => {
				warn!("Streamer rejected {:?} for camera {} with {}", command.action, command.camera_id, status);
				Err(match command.action {
					StreamAction::Start => ApiError::StreamStartFailed { status },
					StreamAction::Stop => ApiError::StreamStopFailed { status },
				})
			},
			Err(TransportError::Timeout) => {
				warn!("Streamer did not answer {:?} for camera {} within {:?}", command.action, command.camera_id, timeout);
				Err(ApiError::StreamerTimeout)
			},
			Err(TransportError::Connect(reason)) => {
				warn!("Streamer unreachable for {:?} on camera {}: {}", command.action, command.camera_id, reason);
				Err(ApiError::StreamerUnreachable)
			},
		}
	}
}
