#[macro_use] extern crate rocket;
#[macro_use] extern crate serde_derive;

use std::sync::Arc;

use clap::{Command, Arg, ArgAction};

use crate::auth::TokenValidator;
use crate::catalog::YamlCatalog;
use crate::config::ConfigManager;
use crate::proxy::StreamSessionProxy;
use crate::streamer::HttpTransport;

mod auth;
mod catalog;
mod common;
mod config;
mod error;
mod proxy;
mod rest_api;
mod streamer;



#[rocket::main]
async fn main() -> anyhow::Result<()> {
	let matches = Command::new("camstream-gateway")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Authorizes camera stream requests and forwards them to the streaming service.")
		.arg(
			Arg::new("config")
				.action(ArgAction::Append)	// Allow argument to be specified multiple times
				.short('c')
				.long("config")
				.help("TOML file with gateway config")
		)
		.get_matches();

	let mut config_manager = ConfigManager::new();
	let config_filename_matches = matches.get_many::<String>("config");
	match config_filename_matches {
		Some(filenames) => {
			config_manager.read_config(filenames.map(|v| v.as_str()).collect())?;
		},
		None => {
			// Use default file path
			config_manager.read_default_config_files()?;
		}
	};
	config_manager.apply_env(|var| std::env::var(var).ok());
	let settings = config_manager.settings()?;

	let catalog = Arc::new(YamlCatalog::load(settings.catalog.path.as_deref()));
	let proxy = StreamSessionProxy::new(
		settings.streamer.clone(),
		catalog.clone(),
		catalog.clone(),
		Arc::new(HttpTransport::new()),
	);
	let tokens = TokenValidator::new(&settings.auth);

	rocket::build()
		.attach(rest_api::stage(proxy, catalog.clone(), catalog, tokens))
		.attach(rest_api::CORS)
		.launch()
		.await?;

	anyhow::Ok(())
}
