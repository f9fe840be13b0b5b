use std::time::Duration;

use url::Url;



#[derive(Clone)]
#[derive(Debug, PartialEq, Eq)]
#[derive(thiserror::Error)]
pub enum TransportError {
	#[error("request timed out")]
	Timeout,
	#[error("connection failed: {0}")]
	Connect(String),
}

// Any HTTP status comes back as Ok; only transport failures are errors.
#[rocket::async_trait]
pub trait StreamerTransport: Send + Sync {
	async fn post(&self, url: Url, token: &str, timeout: Duration) -> Result<u16, TransportError>;
}

pub struct HttpTransport {
	client: reqwest::Client,
}

impl HttpTransport {
	pub fn new() -> Self {
		HttpTransport { client: reqwest::Client::new() }
	}
}

#[rocket::async_trait]
impl StreamerTransport for HttpTransport {
	async fn post(&self, url: Url, token: &str, timeout: Duration) -> Result<u16, TransportError> {
		let response = self.client
			.post(url)
			.bearer_auth(token)
			.timeout(timeout)
			.send()
			.await
			.map_err(|err| {
				if err.is_timeout() {
					TransportError::Timeout
				} else {
					TransportError::Connect(err.to_string())
				}
			})?;
		Ok(response.status().as_u16())
	}
}
