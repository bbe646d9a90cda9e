use std::{collections::HashMap, ffi::OsString, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Arg, Command};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use thiserror::Error;

use crate::{
    log::LogSettings,
    renderer::ChannelSettings,
    retry::RetrySettings,
    rocketchat::settings::{Credentials, Endpoint},
};

/// the config file is unusable, the relay must not start
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("rocket.chat {0} not provided")]
    Missing(&'static str),
    #[error("unsupported rocket.chat scheme {0:?}, expected http or https")]
    Scheme(String),
    #[error("can't load config")]
    Load(#[from] config::ConfigError),
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub endpoint: Endpoint,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub channel: ChannelSettings,
    /// attachment color for firing alerts by `severity` label
    #[serde(default)]
    pub severity_colors: HashMap<String, String>,
    #[serde(default)]
    pub resolved_color: Option<String>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde_as(as = "DurationSeconds<f64>")]
    #[serde(default = "Settings::default_request_timeout")]
    pub request_timeout: Duration,
    /// tera template for the message text
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            credentials: Credentials::default(),
            channel: ChannelSettings::default(),
            severity_colors: HashMap::new(),
            resolved_color: None,
            retry: RetrySettings::default(),
            request_timeout: Self::default_request_timeout(),
            template: None,
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    fn default_request_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// load settings from the yaml file at `path` and validate them
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    /// every field needed to reach and log in to rocket.chat must be set
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("ID", &self.credentials.id),
            ("email", &self.credentials.email),
            ("password", &self.credentials.password),
            ("host", &self.endpoint.host),
            ("scheme", &self.endpoint.scheme),
        ];

        if let Some((name, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ConfigError::Missing(*name));
        }

        match self.endpoint.scheme.as_str() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::Scheme(other.to_owned())),
        }
    }
}

/// command line arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Opts {
    pub config_file: String,
    pub listen_address: SocketAddr,
    pub log_level: Option<String>,
}

impl Opts {
    /// parse the process arguments, prints help or version and exits if asked to
    pub fn parse() -> Result<Self> {
        Self::parse_from(std::env::args_os()).map_err(|err| match err.downcast::<clap::Error>() {
            Ok(err) => err.exit(),
            Err(err) => err,
        })
    }

    pub fn parse_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let opts = Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .author(clap::crate_authors!())
            .args(&[
                Arg::new("config.file")
                    .help("rocket.chat configuration file")
                    .takes_value(true)
                    .long("config.file")
                    .default_value("config/rocketchat.yml"),
                Arg::new("listen.address")
                    .help("the address to listen on for HTTP requests")
                    .takes_value(true)
                    .long("listen.address")
                    .default_value("0.0.0.0:9876"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["error", "warn", "info", "debug", "trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log"),
            ])
            .try_get_matches_from(args)?;

        let config_file = opts.value_of("config.file").unwrap_or_default().to_owned();

        let listen_address = parse_listen_address(opts.value_of("listen.address").unwrap_or_default())?;

        Ok(Self {
            config_file,
            listen_address,
            log_level: opts.value_of("level").map(str::to_owned),
        })
    }
}

/// `:9876` listens on every interface, like `0.0.0.0:9876`
fn parse_listen_address(address: &str) -> Result<SocketAddr> {
    let parsed = match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}").parse(),
        None => address.parse(),
    };

    parsed.with_context(|| format!("invalid listen address {address:?}"))
}
