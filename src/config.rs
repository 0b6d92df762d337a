//! Configuration manager for dorado.

use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::upload::Naming;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:4000";
const DEFAULT_BASE_PATH: &str = "/dorado";
const DEFAULT_UPLOAD_PATH: &str = "./imagenes";
const DEFAULT_UPLOAD_SIZE: usize = 5 * 1024 * 1024; // 5 MiB.
const DEFAULT_TOKEN_EXPIRATION: u64 = 60 * 60 * 24 * 30; // 30 days.
const DEFAULT_OPAQUE_TOKEN_TTL: u64 = 60 * 60 * 24; // 24 hours.
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public URL of current instance.
    pub url: String,
    /// Listening socket.
    #[serde(skip_serializing)]
    pub address: String,
    /// Prefix every API route is nested under.
    pub base_path: String,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Validity of confirmation and reset tokens, in seconds.
    #[serde(skip_serializing)]
    pub opaque_token_ttl: u64,
    /// Related to cross-origin requests.
    #[serde(skip_serializing)]
    pub cors: Cors,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Token,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to automatic mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Related to image uploads.
    #[serde(skip_serializing)]
    pub uploads: Uploads,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            url: "http://localhost:4000/".to_owned(),
            address: DEFAULT_ADDRESS.to_owned(),
            base_path: DEFAULT_BASE_PATH.to_owned(),
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            opaque_token_ttl: DEFAULT_OPAQUE_TOKEN_TTL,
            cors: Cors::default(),
            token: Token::default(),
            postgres: None,
            argon2: None,
            mail: None,
            uploads: Uploads::default(),
        }
    }
}

/// Browser origins allowed to call the API.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cors {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// RabbitMQ mailing queue configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Hostname:(?port) for RabbitMQ instance.
    pub address: String,
    /// RabbitMQ default vhost.
    pub vhost: Option<String>,
    /// RabbitMQ username to access queue.
    pub username: String,
    /// RabbitMQ password to access queue.
    pub password: String,
    /// Max channel connections.
    pub pool: Option<u16>,
    /// Queue name to send mailing events.
    pub queue: String,
}

/// Session token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    /// HMAC secret. `JWT_SECRET` takes precedence.
    pub secret: String,
    /// Lifetime in seconds.
    pub expiration: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            secret: String::default(),
            expiration: DEFAULT_TOKEN_EXPIRATION,
        }
    }
}

/// Image storage configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Uploads {
    /// Root directory, one sub-directory per entity type.
    pub path: PathBuf,
    /// Maximum request body size for uploads, in bytes.
    pub max_size: usize,
    /// `uuid` or `timestamp`.
    pub naming: Naming,
}

impl Default for Uploads {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_UPLOAD_PATH),
            max_size: DEFAULT_UPLOAD_SIZE,
            naming: Naming::default(),
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Parsed listening address, `PORT` overriding the configured port.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let mut addr: SocketAddr = self.address.parse()?;
        if let Some(port) = std::env::var("PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
        {
            addr.set_port(port);
        }
        Ok(addr)
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Origins are compared verbatim against the `Origin` header, which
    /// never carries a trailing slash.
    fn normalize_origin(origin: &str) -> String {
        origin.trim().trim_end_matches('/').to_owned()
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let mut config = match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file)
            {
                Ok(config) => config,
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        };

        // set app version.
        config.version = VERSION.to_owned();
        config.url = self.normalize_url(&config.url)?;
        config.cors.allowed_origins = config
            .cors
            .allowed_origins
            .iter()
            .filter(|origin| !origin.trim().is_empty())
            .map(|origin| Self::normalize_origin(origin))
            .collect();

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.token.secret = secret;
        }
        for var in ["FRONTEND_URL", "NATIVE_URL"] {
            if let Ok(origin) = std::env::var(var) {
                config
                    .cors
                    .allowed_origins
                    .push(Self::normalize_origin(&origin));
            }
        }

        Ok(Arc::new(config))
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_read_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
name: dorado
url: api.dorado.test
base_path: /api
opaque_token_ttl: 60
cors:
  allowed_origins:
    - "http://localhost:19006/"
    - ""
token:
  secret: s3cr3t
uploads:
  path: /tmp/dorado
  naming: timestamp
"#
        )
        .unwrap();

        let config = Configuration::default()
            .path(file.path().to_path_buf())
            .read()
            .unwrap();

        assert_eq!(config.url, "https://api.dorado.test/");
        assert_eq!(config.base_path, "/api");
        assert_eq!(config.opaque_token_ttl, 60);
        assert!(
            config
                .cors
                .allowed_origins
                .contains(&"http://localhost:19006".to_owned())
        );
        assert_eq!(config.token.expiration, DEFAULT_TOKEN_EXPIRATION);
        assert_eq!(config.uploads.path, PathBuf::from("/tmp/dorado"));
        assert_eq!(config.uploads.max_size, DEFAULT_UPLOAD_SIZE);
        assert_eq!(config.uploads.naming, Naming::Timestamp);
        assert_eq!(config.version(), VERSION);
        assert!(config.postgres.is_none());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Configuration::default()
            .path(PathBuf::from("/nonexistent/dorado.yaml"))
            .read()
            .unwrap();

        assert_eq!(config.base_path, DEFAULT_BASE_PATH);
        assert_eq!(config.address, DEFAULT_ADDRESS);
    }
}
