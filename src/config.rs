use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use jsonwebtoken::Algorithm;
use log::{info, warn};
use toml::{Table, Value};
use url::Url;



pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["/etc/camstream/gateway.toml", "./gateway.toml"];

// (environment variable, table, key)
const ENV_OVERRIDES: [(&str, &str, &str); 3] = [
	("GIN_HOST", "streamer", "base_url"),
	("SECRET_KEY", "auth", "secret_key"),
	("CAMSTREAM_CATALOG", "catalog", "path"),
];

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
pub struct Settings {
	pub streamer: StreamerSettings,
	pub auth: AuthSettings,
	#[serde(default)]
	pub catalog: CatalogSettings,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
pub struct StreamerSettings {
	pub base_url: Url,
	#[serde(default = "default_start_timeout")]
	pub start_timeout_secs: u64,
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout_secs: u64,
	#[serde(default)]
	pub stop_failure: StopFailurePolicy,
}

impl StreamerSettings {
	#[cfg(test)]
	pub fn new(base_url: Url) -> Self {
		StreamerSettings {
			base_url,
			start_timeout_secs: default_start_timeout(),
			stop_timeout_secs: default_stop_timeout(),
			stop_failure: StopFailurePolicy::default(),
		}
	}

	pub fn start_timeout(&self) -> Duration {
		Duration::from_secs(self.start_timeout_secs)
	}

	pub fn stop_timeout(&self) -> Duration {
		Duration::from_secs(self.stop_timeout_secs)
	}
}

#[derive(Clone, Copy)]
#[derive(Debug, Default, PartialEq, Eq)]
#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopFailurePolicy {
	// log and acknowledge anyway
	#[default]
	Swallow,
	Propagate,
}

#[derive(Clone)]
#[derive(Debug)]
#[derive(Deserialize)]
pub struct AuthSettings {
	pub secret_key: String,
	#[serde(default = "default_algorithm")]
	pub algorithm: Algorithm,
}

#[derive(Clone)]
#[derive(Debug, Default)]
#[derive(Deserialize)]
pub struct CatalogSettings {
	pub path: Option<PathBuf>,
}

fn default_start_timeout() -> u64 {
	30
}

fn default_stop_timeout() -> u64 {
	15
}

fn default_algorithm() -> Algorithm {
	Algorithm::HS256
}



#[derive(Clone)]
#[derive(Debug, Default)]
pub struct ConfigManager {
	table: Table,
}

impl ConfigManager {
	pub fn new() -> Self {
		ConfigManager::default()
	}

	// unlike the default files, these must exist
	pub fn read_config(&mut self, filenames: Vec<&str>) -> anyhow::Result<()> {
		for filename in filenames {
			self.read_file(Path::new(filename))?;
		}
		Ok(())
	}

	pub fn read_default_config_files(&mut self) -> anyhow::Result<()> {
		for filename in DEFAULT_CONFIG_FILES {
			let path = Path::new(filename);
			if path.exists() {
				self.read_file(path)?;
			} else {
				warn!("Config file {} not found; skipping", filename);
			}
		}
		Ok(())
	}

	fn read_file(&mut self, path: &Path) -> anyhow::Result<()> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read config file {}", path.display()))?;
		self.merge_str(&content)
			.with_context(|| format!("failed to parse config file {}", path.display()))?;
		info!("Read config file {}", path.display());
		Ok(())
	}

	pub fn merge_str(&mut self, content: &str) -> anyhow::Result<()> {
		let incoming: Table = content.parse()?;
		merge_tables(&mut self.table, incoming);
		Ok(())
	}

	pub fn apply_env<F>(&mut self, lookup: F)
	where
		F: Fn(&str) -> Option<String>,
	{
		for (var, section, key) in ENV_OVERRIDES {
			if let Some(value) = lookup(var) {
				let entry = self.table
					.entry(section.to_string())
					.or_insert(Value::Table(Table::new()));
				if let Value::Table(section_table) = entry {
					section_table.insert(key.to_string(), Value::String(value));
				} else {
					warn!("Config key {} is not a table; ignoring {}", section, var);
				}
			}
		}
	}

	pub fn settings(&self) -> anyhow::Result<Settings> {
		let settings = Value::Table(self.table.clone())
			.try_into::<Settings>()
			.context("invalid configuration")?;
		Ok(settings)
	}
}

fn merge_tables(into: &mut Table, from: Table) {
	for (key, value) in from {
		if let Value::Table(incoming) = value {
			if let Some(Value::Table(existing)) = into.get_mut(&key) {
				merge_tables(existing, incoming);
				continue;
			}
			into.insert(key, Value::Table(incoming));
		} else {
			into.insert(key, value);
		}
	}
}
