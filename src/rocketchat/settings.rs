//! config file options for the rocket.chat connection

use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize, Clone, Default)]
/// login data of the relay user
pub struct Credentials {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub email: String,
	#[serde(default)]
	pub password: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
/// where the rocket.chat server lives
pub struct Endpoint {
	/// `http` or `https`
	#[serde(default)]
	pub scheme: String,
	/// host name, optionally with port
	#[serde(default)]
	pub host: String,
}

impl Endpoint {
	/// base url of the rocket.chat server
	pub fn base_url(&self) -> Result<Url, url::ParseError> {
		Url::parse(&format!("{}://{}/", self.scheme, self.host))
	}
}
