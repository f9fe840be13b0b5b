use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use log::{error, info, warn};

use crate::common::{Camera, CameraAccessGrant, CameraId};



#[rocket::async_trait]
pub trait UserCameraService: Send + Sync {
	async fn find_grant(&self, user_id: &str, camera_id: CameraId) -> anyhow::Result<Option<CameraAccessGrant>>;

	async fn grants_for_user(&self, user_id: &str) -> anyhow::Result<Vec<CameraAccessGrant>>;

	async fn set_favorite(&self, user_id: &str, camera_id: CameraId, favorite: bool) -> anyhow::Result<FavoriteChange>;
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
pub enum FavoriteChange {
	Changed(CameraAccessGrant),
	// flag already had the requested value
	Unchanged(CameraAccessGrant),
	NoGrant,
}

#[rocket::async_trait]
pub trait CameraService: Send + Sync {
	async fn find_camera(&self, id: CameraId) -> anyhow::Result<Option<Camera>>;
}



#[derive(Clone)]
#[derive(Debug, Default, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct CatalogData {
	#[serde(default)]
	pub cameras: Vec<Camera>,
	#[serde(default)]
	pub grants: Vec<CameraAccessGrant>,
}

pub struct YamlCatalog {
	path: Option<PathBuf>,
	// tokio's RwLock so a waiting writer blocks new readers
	data: RwLock<CatalogData>,
	// serializes file writes without holding `data` during disk I/O
	save_lock: Mutex<()>,
}

impl YamlCatalog {
	pub fn new(data: CatalogData) -> Self {
		YamlCatalog { path: None, data: RwLock::new(data), save_lock: Mutex::new(()) }
	}

	pub fn load(path: Option<&Path>) -> Self {
		match path {
			Some(path) => YamlCatalog {
				path: Some(path.to_path_buf()),
				data: RwLock::new(read_catalog_file(path)),
				save_lock: Mutex::new(()),
			},
			None => {
				warn!("No catalog file configured; starting with an empty catalog");
				YamlCatalog::new(CatalogData::default())
			}
		}
	}

	async fn save(&self, data: &CatalogData) {
		let Some(path) = &self.path else {
			return;
		};
		match write_catalog_file(path, data).await {
			Ok(_) => {
				info!("Wrote catalog file {}", path.display());
			},
			Err(err) => {
				error!("Failed to write catalog file; error was {}", err);
			}
		}
	}
}

#[rocket::async_trait]
impl UserCameraService for YamlCatalog {
	async fn find_grant(&self, user_id: &str, camera_id: CameraId) -> anyhow::Result<Option<CameraAccessGrant>> {
		let data = self.data.read().await;
		Ok(data.grants.iter()
			.find(|grant| grant.user_id == user_id && grant.camera_id == camera_id)
			.cloned())
	}

	async fn grants_for_user(&self, user_id: &str) -> anyhow::Result<Vec<CameraAccessGrant>> {
		let data = self.data.read().await;
		Ok(data.grants.iter()
			.filter(|grant| grant.user_id == user_id)
			.cloned()
			.collect())
	}

	async fn set_favorite(&self, user_id: &str, camera_id: CameraId, favorite: bool) -> anyhow::Result<FavoriteChange> {
		// taken first so snapshots reach the file in the order they were made
		let _saving = self.save_lock.lock().await;

		let (change, snapshot) = {
			let mut data = self.data.write().await;
			let grant = match data.grants.iter_mut()
				.find(|grant| grant.user_id == user_id && grant.camera_id == camera_id)
			{
				Some(grant) => grant,
				None => return Ok(FavoriteChange::NoGrant),
			};
			if grant.favorite == favorite {
				return Ok(FavoriteChange::Unchanged(grant.clone()));
			}
			grant.favorite = favorite;
			let change = FavoriteChange::Changed(grant.clone());
			(change, data.clone())
		};

		self.save(&snapshot).await;
		Ok(change)
	}
}

#[rocket::async_trait]
impl CameraService for YamlCatalog {
	async fn find_camera(&self, id: CameraId) -> anyhow::Result<Option<Camera>> {
		let data = self.data.read().await;
		Ok(data.cameras.iter().find(|camera| camera.id == id).cloned())
	}
}



fn read_catalog_file(path: &Path) -> CatalogData {
	match File::open(path) {
		Ok(file) => {
			let buf_reader = BufReader::new(file);
			match serde_yaml::from_reader(buf_reader) {
				Ok(data) => data,
				Err(err) => {
					error!("Failed to read catalog file; error was {}", err);
					CatalogData::default()
				}
			}
		},
		Err(err) => {
			// expected on a fresh install
			warn!("Failed to open catalog file for reading; error was {}", err);
			CatalogData::default()
		}
	}
}

async fn write_catalog_file(path: &Path, data: &CatalogData) -> anyhow::Result<()> {
	let file = tokio::fs::File::create(path).await?;

	let yaml = serde_yaml::to_string(data)?;
	let mut writer = tokio::io::BufWriter::new(file);
	writer.write_all(yaml.as_bytes()).await?;
	writer.flush().await?;
	Ok(())
}
