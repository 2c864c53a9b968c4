use anyhow::Context;
use crate::core::FramePolicy;
use crate::hardware::{BusBackend, InterfaceType};
use crate::input::load_trace_part;
use crate::playback::{Assignment, ReplayOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub use crate::input::TracePart;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no workers configured")]
    NoWorkers,

    #[error("duplicate worker tag {0:?}")]
    DuplicateTag(String),

    #[error("worker {tag:?}: part {index} of {of} is out of range")]
    InvalidPart { tag: String, index: usize, of: usize },

    #[error("receive timeout must be greater than zero")]
    ZeroTimeout,
}

/// One replay worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub tag: String,
    pub trace: PathBuf,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Only use the first rows of the file
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub part: Option<TracePart>,
}

fn default_channel() -> String {
    "vcan0".to_string()
}

/// Run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub backend: InterfaceType,
    pub receive_timeout_ms: u64,
    pub speed: f64,
    pub force_fd: bool,
    pub require_payload: bool,
    pub workers: Vec<WorkerConfig>,
}

impl Default for ReplayConfig {
    /// Two halves of the CAN FD capture plus two classic captures, all on `vcan0`
    fn default() -> Self {
        let worker = |tag: &str, trace: &str, part: Option<TracePart>| WorkerConfig {
            tag: tag.to_string(),
            trace: PathBuf::from(trace),
            channel: default_channel(),
            limit: Some(10),
            part,
        };

        Self {
            backend: InterfaceType::SocketCan,
            receive_timeout_ms: 1000,
            speed: 1.0,
            force_fd: false,
            require_payload: false,
            workers: vec![
                worker("proc_fd_1", "timestamp_canfd_message.csv", Some(TracePart { index: 0, of: 2 })),
                worker("proc_fd_2", "timestamp_canfd_message.csv", Some(TracePart { index: 1, of: 2 })),
                worker("proc_can_1", "can1_message.csv", None),
                worker("proc_can_2", "can2_message.csv", None),
            ],
        }
    }
}

impl ReplayConfig {
    /// Default location: `<config dir>/can-replay/config.json`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("can-replay").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path, else the default location if present, else built-in defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::config_path() {
            Some(path) if path.exists() => {
                info!("Using config {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.is_empty() {
            return Err(ConfigError::NoWorkers);
        }
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut tags = HashSet::new();
        for worker in &self.workers {
            if !tags.insert(worker.tag.as_str()) {
                return Err(ConfigError::DuplicateTag(worker.tag.clone()));
            }
            if let Some(TracePart { index, of }) = worker.part {
                if of == 0 || index >= of {
                    return Err(ConfigError::InvalidPart {
                        tag: worker.tag.clone(),
                        index,
                        of,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn options(&self) -> ReplayOptions {
        ReplayOptions {
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            policy: FramePolicy {
                force_fd: self.force_fd,
                require_payload: self.require_payload,
            },
            ..ReplayOptions::default()
        }
        .with_speed(self.speed)
    }

    pub fn backend(&self) -> BusBackend {
        BusBackend::from_type(self.backend)
    }

    /// Load every worker's trace, or its part of a shared one
    pub fn load_assignments(&self) -> anyhow::Result<Vec<Assignment>> {
        self.workers
            .iter()
            .map(|worker| {
                let trace = load_trace_part(&worker.trace, worker.limit, worker.part)
                    .with_context(|| format!("Loading trace for worker {}", worker.tag))?;
                Ok(Assignment::new(&worker.tag, &worker.channel, trace))
            })
            .collect()
    }
}
