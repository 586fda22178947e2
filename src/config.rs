//! Server configuration.
//!
//! Values are layered, highest precedence first: CLI flag, environment
//! variable, TOML file (`--config` / `TOYSHOP_CONFIG`), compiled-in default.
//! The resolved [`ServerConfig`] is built once at startup and never mutated.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Version prefix every route unit is mounted under.
pub const API_PREFIX: &str = "/api/v1.0";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_UPLOADS_PATH: &str = "/toys-images";
pub const DEFAULT_UPLOADS_DIR: &str = "./uploads/toys";
pub const DEFAULT_DATABASE_PATH: &str = "toyshop.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid uploads path {0:?}: must be a non-root URL prefix outside the API namespace")]
    InvalidUploadsPath(String),

    #[error("cannot determine application base directory: {0}")]
    BaseDir(#[source] std::io::Error),
}

/// Identifier format enforced on `id` path parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IdFormatKind {
    /// 24 hexadecimal characters (document-store object id).
    #[default]
    ObjectId,
    /// RFC 4122 UUID in any textual form `uuid` accepts.
    Uuid,
    /// Positive 64-bit integer (row id).
    Integer,
}

/// Where uploaded assets are served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticMountConfig {
    /// URL prefix, always with a single leading `/` and no trailing `/`.
    pub public_prefix: String,
    /// Absolute directory the prefix maps onto.
    pub disk_root: PathBuf,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database_path: PathBuf,
    pub id_format: IdFormatKind,
    pub uploads: StaticMountConfig,
}

impl ServerConfig {
    /// Compiled-in defaults with relative paths resolved under `base_dir`.
    pub fn with_base_dir(base_dir: &Path) -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            database_path: base_dir.join(DEFAULT_DATABASE_PATH),
            id_format: IdFormatKind::default(),
            uploads: StaticMountConfig {
                public_prefix: DEFAULT_UPLOADS_PATH.to_string(),
                disk_root: resolve_disk_root(base_dir, DEFAULT_UPLOADS_DIR),
            },
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Optional TOML layer. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub uploads_path: Option<String>,
    pub uploads_dir: Option<String>,
    pub database_path: Option<PathBuf>,
    pub id_format: Option<IdFormatKind>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }
}

/// Command-line / environment layer.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(long, global = true, env = "TOYSHOP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base directory relative paths are resolved against [default: current directory]
    #[arg(long, global = true, env = "TOYSHOP_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Listen address [default: 0.0.0.0]
    #[arg(long, global = true, env = "TOYSHOP_HOST")]
    pub host: Option<IpAddr>,

    /// Listen port [default: 3000]
    #[arg(long, global = true, env = "PORT")]
    pub port: Option<u16>,

    /// Public URL prefix for uploaded files [default: /toys-images]
    #[arg(long, global = true, env = "UPLOADS_PATH")]
    pub uploads_path: Option<String>,

    /// Directory holding uploaded files [default: ./uploads/toys]
    #[arg(long, global = true, env = "UPLOADS_DIR")]
    pub uploads_dir: Option<String>,

    /// SQLite database file [default: toyshop.db]
    #[arg(long, global = true, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Identifier format accepted for `id` path parameters [default: object-id]
    #[arg(long, global = true, env = "ID_FORMAT", value_enum)]
    pub id_format: Option<IdFormatKind>,
}

impl ConfigArgs {
    /// Merge flags/env over the optional file over defaults.
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        let base_dir = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(ConfigError::BaseDir)?,
        };
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => {
                debug!("no config file given, using environment and defaults");
                FileConfig::default()
            }
        };

        let uploads_path = self
            .uploads_path
            .clone()
            .or(file.uploads_path)
            .unwrap_or_else(|| DEFAULT_UPLOADS_PATH.to_string());
        let uploads_dir = self
            .uploads_dir
            .clone()
            .or(file.uploads_dir)
            .unwrap_or_else(|| DEFAULT_UPLOADS_DIR.to_string());
        let database_path = self
            .database_path
            .clone()
            .or(file.database_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        Ok(ServerConfig {
            host: self.host.or(file.host).unwrap_or(DEFAULT_HOST),
            port: self.port.or(file.port).unwrap_or(DEFAULT_PORT),
            database_path: base_dir.join(database_path),
            id_format: self.id_format.or(file.id_format).unwrap_or_default(),
            uploads: StaticMountConfig {
                public_prefix: normalize_public_prefix(&uploads_path)?,
                disk_root: resolve_disk_root(&base_dir, &uploads_dir),
            },
        })
    }
}

/// Force a single leading `/`, drop trailing ones, and refuse prefixes that
/// would shadow the API.
pub fn normalize_public_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidUploadsPath(raw.to_string()));
    }
    let prefix = format!("/{trimmed}");
    let shadows_api = prefix == API_PREFIX
        || prefix.starts_with(&format!("{API_PREFIX}/"))
        || API_PREFIX.starts_with(&format!("{prefix}/"));
    if shadows_api || prefix.contains('{') || prefix.contains("//") {
        return Err(ConfigError::InvalidUploadsPath(raw.to_string()));
    }
    Ok(prefix)
}

/// `./uploads/toys` and `uploads/toys` name the same directory under `base_dir`.
pub fn resolve_disk_root(base_dir: &Path, raw: &str) -> PathBuf {
    let stripped = raw.strip_prefix("./").unwrap_or(raw);
    let path = Path::new(stripped);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
