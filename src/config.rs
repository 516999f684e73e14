//! Configuration for the server and client binaries.
//!
//! The server reads command-line arguments and an optional TOML file;
//! CLI arguments take precedence over config file values. The client is
//! configured from the command line only.

use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddrV4;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::Semaphore;

/// Command-line arguments for the file server
#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(version)]
#[command(about = "Serve files from a directory over TCP", long_about = None)]
pub struct ServerArgs {
    /// Address to listen on (e.g., 127.0.0.1:9000)
    #[arg(
        short = 'c',
        long = "listen",
        value_name = "IP:PORT",
        required_unless_present = "config"
    )]
    pub listen: Option<String>,

    /// Directory to serve files from
    #[arg(
        short = 'f',
        long = "root",
        value_name = "DIRECTORY",
        required_unless_present = "config"
    )]
    pub root: Option<PathBuf>,

    /// Path to TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of transfers served at once
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Command-line arguments for the download client
#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(version)]
#[command(about = "Download one file from a file server", long_about = None)]
pub struct ClientArgs {
    /// Server address (e.g., 127.0.0.1:9000)
    #[arg(short = 'c', long = "connect", value_name = "IP:PORT")]
    pub connect: String,

    /// Name of the file to request
    #[arg(short = 'f', long = "file", value_name = "FILENAME")]
    pub filename: String,

    /// Folder the received file is written into
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_FOLDER")]
    pub output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[server]` table
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    pub listen: Option<String>,
    /// Directory to serve
    pub root: Option<PathBuf>,
    /// Concurrency cap and listen backlog
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: None,
            root: None,
            max_clients: default_max_clients(),
        }
    }
}

/// `[logging]` table
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_clients() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddrV4,
    pub root: PathBuf,
    pub max_clients: usize,
    pub log_level: String,
}

impl ServerConfig {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        let toml_config = match args.config {
            Some(ref config_path) => {
                let contents = std::fs::read_to_string(config_path)
                    .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
            }
            None => TomlConfig::default(),
        };

        let listen = args
            .listen
            .or(toml_config.server.listen)
            .ok_or(ConfigError::Missing("listen address (-c)"))?;
        let root = args
            .root
            .or(toml_config.server.root)
            .ok_or(ConfigError::Missing("root directory (-f)"))?;
        let max_clients = args.max_clients.unwrap_or(toml_config.server.max_clients);
        if max_clients == 0 {
            return Err(ConfigError::ZeroMaxClients);
        }
        if max_clients > Semaphore::MAX_PERMITS {
            return Err(ConfigError::TooManyClients(max_clients));
        }

        Ok(ServerConfig {
            listen: parse_endpoint(&listen)?,
            root,
            max_clients,
            log_level: args.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Final resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddrV4,
    pub filename: String,
    pub output: PathBuf,
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration from CLI args.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ClientArgs::parse())
    }

    pub fn from_args(args: ClientArgs) -> Result<Self, ConfigError> {
        if !is_plain_relative(Path::new(&args.filename)) {
            return Err(ConfigError::InvalidFilename(args.filename));
        }

        Ok(ClientConfig {
            server: parse_endpoint(&args.connect)?,
            filename: args.filename,
            output: args.output,
            log_level: args.log_level,
        })
    }

    /// Where the received file is written.
    ///
    /// Only the normal components of the filename are joined, so the
    /// result always stays under the output folder.
    pub fn output_path(&self) -> PathBuf {
        let mut path = self.output.clone();
        for component in Path::new(&self.filename).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path
    }
}

/// A non-empty relative path with no `..`, root or prefix components.
fn is_plain_relative(path: &Path) -> bool {
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    normal > 0
}

/// Parse an `ip:port` pair. The address must be IPv4 and the port non-zero.
pub fn parse_endpoint(s: &str) -> Result<SocketAddrV4, ConfigError> {
    let addr: SocketAddrV4 = s
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEndpoint(s.to_string()))?;
    if addr.port() == 0 {
        return Err(ConfigError::InvalidEndpoint(s.to_string()));
    }
    Ok(addr)
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid address '{0}', expected <ipv4>:<port>")]
    InvalidEndpoint(String),
    #[error("Missing {0}")]
    Missing(&'static str),
    #[error("max_clients must be at least 1")]
    ZeroMaxClients,
    #[error("max_clients {0} exceeds the supported maximum")]
    TooManyClients(usize),
    #[error("Invalid filename '{0}', expected a relative path inside the output folder")]
    InvalidFilename(String),
}
