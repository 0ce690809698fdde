//! Role configuration.
//!
//! Each role reads a plain text file holding one value per line, in a fixed
//! order.  Surrounding whitespace (including a trailing `\r`) is trimmed.
//!
//! | role        | lines                                                         |
//! |-------------|---------------------------------------------------------------|
//! | coordinator | client ip, client port, worker ip, worker port                |
//! | worker      | coordinator ip, coordinator port, own ip, own port, folder, category |
//! | client      | username, folder, coordinator ip, coordinator port            |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::category::Category;
use crate::error::ConfigError;

/// Coordinator listening endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub client_ip: String,
    pub client_port: u16,
    pub worker_ip: String,
    pub worker_port: u16,
}

impl CoordinatorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = Lines::new(text);
        Ok(Self {
            client_ip: lines.string("client ip")?,
            client_port: lines.port("client port")?,
            worker_ip: lines.string("worker ip")?,
            worker_port: lines.port("worker port")?,
        })
    }

    /// Distinct `ip:port` strings to listen on.
    pub fn listen_addrs(&self) -> Vec<String> {
        let client = format!("{}:{}", self.client_ip, self.client_port);
        let worker = format!("{}:{}", self.worker_ip, self.worker_port);
        if client == worker {
            vec![client]
        } else {
            vec![client, worker]
        }
    }
}

/// Worker process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub coordinator_ip: String,
    pub coordinator_port: u16,
    /// Address advertised to clients.
    pub ip: String,
    /// Listening port; `0` lets the OS pick one.
    pub port: u16,
    pub folder: PathBuf,
    pub category: Category,
}

impl WorkerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = Lines::new(text);
        Ok(Self {
            coordinator_ip: lines.string("coordinator ip")?,
            coordinator_port: lines.port("coordinator port")?,
            ip: lines.string("worker ip")?,
            port: lines.port("worker port")?,
            folder: PathBuf::from(lines.string("folder")?),
            category: {
                let raw = lines.string("category")?;
                raw.parse::<Category>()
                    .map_err(|_| ConfigError::InvalidCategory(raw))?
            },
        })
    }

    pub fn coordinator_addr(&self) -> String {
        format!("{}:{}", self.coordinator_ip, self.coordinator_port)
    }
}

/// Client process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub username: String,
    pub folder: PathBuf,
    pub coordinator_ip: String,
    pub coordinator_port: u16,
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut lines = Lines::new(text);
        Ok(Self {
            username: lines.string("username")?,
            folder: PathBuf::from(lines.string("folder")?),
            coordinator_ip: lines.string("coordinator ip")?,
            coordinator_port: lines.port("coordinator port")?,
        })
    }

    pub fn coordinator_addr(&self) -> String {
        format!("{}:{}", self.coordinator_ip, self.coordinator_port)
    }
}

/// Runtime switches for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinatorOptions {
    /// Deadline for each frame read or write; `None` waits forever.
    pub io_timeout: Option<Duration>,
    /// Mark a worker unavailable when its registration connection sends a
    /// disconnect frame or drops.  Off by default: registrations persist.
    pub clear_on_disconnect: bool,
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

struct Lines<'a> {
    inner: std::str::Lines<'a>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines(),
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String, ConfigError> {
        match self.inner.next().map(str::trim) {
            Some(line) if !line.is_empty() => Ok(line.to_string()),
            _ => Err(ConfigError::MissingLine(field)),
        }
    }

    fn port(&mut self, field: &'static str) -> Result<u16, ConfigError> {
        let raw = self.string(field)?;
        raw.parse().map_err(|_| ConfigError::InvalidPort { field, value: raw })
    }
}
