//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

/// Default bind host for the HTTP server
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default bind port for the HTTP server
pub const DEFAULT_PORT: u16 = 5780;

/// Placeholder secret used when none is configured. Tokens signed with it
/// are only acceptable in local development.
const DEV_JWT_SECRET: &str = "compass-dev-secret-not-for-production-00";

/// Gate on the career-timeline routes.
///
/// `off` disables them, `dev` restricts them to Maintainers, `hr` to
/// HR manager / CEO / Maintainer plus the user themselves, `all` applies
/// the regular visibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineAccess {
    Off,
    Dev,
    Hr,
    All,
}

impl TimelineAccess {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(TimelineAccess::Off),
            "dev" => Ok(TimelineAccess::Dev),
            "hr" => Ok(TimelineAccess::Hr),
            "all" => Ok(TimelineAccess::All),
            other => Err(Error::Config(format!(
                "Invalid timeline access value: {} (expected off|dev|hr|all)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineAccess::Off => "off",
            TimelineAccess::Dev => "dev",
            TimelineAccess::Hr => "hr",
            TimelineAccess::All => "all",
        }
    }
}

/// Server configuration resolved from environment variables with TOML
/// config-file fallback
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub timeline_access: TimelineAccess,
}

/// `[server]` section of the optional TOML config file
#[derive(Debug, Default, Deserialize)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
    jwt_secret: Option<String>,
    timeline_access: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    server: ServerFileConfig,
    #[allow(dead_code)]
    data_dir: Option<String>,
}

impl ServerConfig {
    /// Resolve the server configuration.
    ///
    /// Each field resolves independently: environment variable first
    /// (`COMPASS_HOST`, `COMPASS_PORT`, `COMPASS_JWT_SECRET`,
    /// `FEATURE_CAREER_TIMELINE_ACCESS`), then the `[server]` section of the
    /// config file, then a compiled default.
    pub fn resolve() -> Result<Self> {
        let file = load_file_config().unwrap_or_default();

        let host = std::env::var("COMPASS_HOST")
            .ok()
            .or(file.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match std::env::var("COMPASS_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("Invalid COMPASS_PORT: {}", raw)))?,
            Err(_) => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        let jwt_secret = std::env::var("COMPASS_JWT_SECRET")
            .ok()
            .or(file.server.jwt_secret)
            .unwrap_or_else(|| {
                warn!("COMPASS_JWT_SECRET not set, using development secret");
                DEV_JWT_SECRET.to_string()
            });
        if jwt_secret.len() < 32 {
            return Err(Error::Config(
                "COMPASS_JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        let timeline_access = match std::env::var("FEATURE_CAREER_TIMELINE_ACCESS") {
            Ok(raw) => TimelineAccess::parse(&raw)?,
            Err(_) => match file.server.timeline_access {
                Some(raw) => TimelineAccess::parse(&raw)?,
                None => TimelineAccess::All,
            },
        };

        Ok(ServerConfig {
            host,
            port,
            jwt_secret,
            timeline_access,
        })
    }
}

/// Data directory resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `COMPASS_DATA_DIR` environment variable
/// 3. `data_dir` key in the TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("COMPASS_DATA_DIR") {
        return PathBuf::from(path);
    }

    if let Ok(config_path) = config_file_path() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_dir) = config.get("data_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(data_dir);
                }
            }
        }
    }

    default_data_dir()
}

/// Database file path inside the data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("compass.db")
}

fn load_file_config() -> Result<FileConfig> {
    let path = config_file_path()?;
    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
}

/// Get the configuration file path for the platform
fn config_file_path() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/compass/config.toml first, then /etc/compass/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("compass").join("config.toml"));
        let system_config = PathBuf::from("/etc/compass/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let path = dirs::config_dir()
        .map(|d| d.join("compass").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("compass"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/compass"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("compass"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/compass"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("compass"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\compass"))
    } else {
        PathBuf::from("./compass_data")
    }
}
