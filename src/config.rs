use std::{
    fs,
    io::{self, Read},
    net::{SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::Deserialize;

use crate::{
    cli::ServerOptions,
    error::{ConfigLoadError, StartError},
};

/// Server types this binary can run.
pub const SERVER_TYPES: &[&str] = &["http"];

/// Resolved configuration of the managed server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub root: PathBuf,
    pub grace: Duration,
    pub pidfile: Option<PathBuf>,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, StartError> {
        let resolve_error = |reason: String| StartError::Resolve {
            addr: format!("{}:{}", self.host, self.port),
            reason,
        };

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| resolve_error(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_error("no addresses".to_string()))
    }
}

/// Overrides read from a config file. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    host: Option<String>,
    port: Option<u16>,
    root: Option<PathBuf>,
    grace: Option<u64>,
}

impl ConfigFile {
    const CONFIG_FILE_LOCAL: &'static str = concat!("./", env!("CARGO_PKG_NAME"), ".cfg");

    fn parse(input: &str) -> Result<Self, ConfigLoadError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str::<ConfigFile>(input)?)
    }

    fn read(path: &Path) -> Result<Self, ConfigLoadError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&input)
    }
}

/// Load the configuration for `server_type`, looking at `-conf`, then the
/// local config file, then falling back to the flag defaults.
pub fn load(server_type: &str, options: &ServerOptions) -> Result<ServerConfig, ConfigLoadError> {
    load_from(server_type, options, Path::new(ConfigFile::CONFIG_FILE_LOCAL))
}

fn load_from(server_type: &str, options: &ServerOptions, local: &Path) -> Result<ServerConfig, ConfigLoadError> {
    if !SERVER_TYPES.contains(&server_type) {
        return Err(ConfigLoadError::UnknownServerType(server_type.to_string()));
    }

    let file = match options.conf.as_deref() {
        Some("stdin") => {
            debug!("Reading config from stdin");
            let mut input = String::new();
            io::stdin().read_to_string(&mut input).map_err(ConfigLoadError::Stdin)?;
            ConfigFile::parse(&input)?
        }
        Some(path) => {
            debug!("Reading config from {}", path);
            ConfigFile::read(Path::new(path))?
        }
        None if local.is_file() => {
            debug!("Reading config from {}", local.display());
            ConfigFile::read(local)?
        }
        None => ConfigFile::default(),
    };

    let config = ServerConfig {
        host: file.host.unwrap_or_else(|| options.host.clone()),
        port: file.port.unwrap_or(options.port),
        root: file.root.unwrap_or_else(|| options.root.clone()),
        grace: Duration::from_secs(file.grace.unwrap_or(options.grace)),
        pidfile: options.pidfile.clone(),
    };

    if !config.root.is_dir() {
        return Err(ConfigLoadError::Root(config.root));
    }

    Ok(config)
}
