//! Server-block configuration.
//!
//! The config file is TOML: a `[[server]]` array where each block describes
//! one virtual server (listen port, document root, limits, timeouts) and
//! nests `[[server.location]]` route blocks. The whole model is immutable
//! after startup; a malformed file is a startup-fatal error.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::http::{HttpMethod, http_method_from_str};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "server")]
    pub servers: Vec<ServerBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerBlock {
    pub listen: u16,

    #[serde(default = "default_server_name")]
    pub server_name: String,

    pub root: String,

    #[serde(default)]
    pub autoindex: bool,

    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default = "default_body_size")]
    pub client_body_size: usize,

    #[serde(
        default = "default_keepalive_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub keepalive_timeout: Duration,

    #[serde(
        default = "default_send_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub send_timeout: Duration,

    #[serde(rename = "location", default)]
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub path: String,

    #[serde(default = "default_methods")]
    pub methods: Vec<String>,

    #[serde(default)]
    pub redirect: Option<String>,

    /// File extension routed to CGI, e.g. ".py".
    #[serde(default)]
    pub cgi: Option<String>,

    #[serde(default)]
    pub cgi_interpreter: Option<String>,
}

impl Location {
    pub fn allows(&self, method: HttpMethod) -> bool {
        self.methods
            .iter()
            .any(|m| http_method_from_str(m) == method)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Config::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid("no server blocks".into()));
        }

        for server in &mut self.servers {
            if server.root.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "server {}: empty root",
                    server.server_name
                )));
            }

            // A server without routes still serves its root.
            if server.locations.is_empty() {
                server.locations.push(Location {
                    path: "/".to_string(),
                    methods: default_methods(),
                    redirect: None,
                    cgi: None,
                    cgi_interpreter: None,
                });
            }

            for location in &server.locations {
                if !location.path.starts_with('/') {
                    return Err(ConfigError::Invalid(format!(
                        "location {}: path must start with '/'",
                        location.path
                    )));
                }
                for method in &location.methods {
                    if http_method_from_str(method) == HttpMethod::Unknown {
                        return Err(ConfigError::Invalid(format!(
                            "location {}: unknown method {method}",
                            location.path
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn default_server_name() -> String {
    "localhost".to_string()
}

fn default_index() -> String {
    "index.html".to_string()
}

fn default_body_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_keepalive_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string(), "POST".to_string(), "DELETE".to_string()]
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Ok(Duration::from_secs_f64(secs))
}
