//! Configuration loading.
//!
//! Values come from, lowest to highest priority: built-in defaults, an optional TOML
//! file, and `GSNODE_*` environment variables.
//!
//! ```toml
//! search_paths = [{ var = "PYTHONPATH", entries = ["/opt/ml/code/graphstorm/python"] }]
//!
//! [boot]
//! hosts_file = "/etc/hosts"
//! handoff = "replace"
//!
//! [[variants]]
//! selector = "trn"
//! label = "TRN"
//! base_image = "example.com/neuron-training:1.13.1"
//! dependencies = [{ name = "dgl", version = "1.0.4" }]
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
  DEFAULT_CONFIG_PATH, DEFAULT_HOSTS_FILE, DEFAULT_INSTALL_PATH, DEFAULT_MARKER_PATH, DEFAULT_RESOURCE_CONFIG,
  DEFAULT_SHELL,
};
use crate::env::SearchPath;
use crate::variant::BuildVariant;

pub const ENV_CONFIG: &str = "GSNODE_CONFIG";
/// Build parameter: the device selector when none is given on the command line.
pub const ENV_DEVICE: &str = "GSNODE_DEVICE";
pub const ENV_HOSTS_FILE: &str = "GSNODE_HOSTS_FILE";
pub const ENV_RESOURCE_CONFIG: &str = "GSNODE_RESOURCE_CONFIG";
pub const ENV_ADVERTISE_ADDR_OVERRIDE: &str = "GSNODE_ADVERTISE_ADDR";
pub const ENV_HOSTNAME_OVERRIDE: &str = "GSNODE_HOSTNAME";
pub const ENV_DEFAULT_SHELL: &str = "GSNODE_DEFAULT_SHELL";
pub const ENV_MARKER_FILE: &str = "GSNODE_MARKER_FILE";
pub const ENV_HANDOFF: &str = "GSNODE_HANDOFF";
/// Build parameter: the bootstrapper binary staged into rendered layers.
pub const ENV_BINARY: &str = "GSNODE_BINARY";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid value {value:?} for {var}: {reason}")]
  InvalidEnv { var: String, value: String, reason: String },
}

/// How control passes to the delegated command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
  /// Replace the bootstrapper process (`execvp`).
  #[default]
  Replace,
  /// Spawn the command, wait for it and exit with its code.
  Supervise,
}

impl std::str::FromStr for HandoffMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "replace" => Ok(Self::Replace),
      "supervise" => Ok(Self::Supervise),
      other => Err(format!("expected 'replace' or 'supervise', got '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootConfig {
  /// Hosts table the correction is written to.
  pub hosts_file: PathBuf,
  /// Platform resource config carrying `current_host`.
  pub resource_config: PathBuf,
  /// Skip detection and advertise this address.
  pub advertise_addr: Option<IpAddr>,
  /// Use this hostname instead of the kernel's.
  pub hostname: Option<String>,
  /// Target used to find the primary interface address. Nothing is sent to it.
  pub probe_target: SocketAddr,
  /// Delegated command when none is given.
  pub default_shell: String,
  pub handoff: HandoffMode,
  /// Variant marker written into the image at build time.
  pub marker_file: PathBuf,
}

impl Default for BootConfig {
  fn default() -> Self {
    Self {
      hosts_file: PathBuf::from(DEFAULT_HOSTS_FILE),
      resource_config: PathBuf::from(DEFAULT_RESOURCE_CONFIG),
      advertise_addr: None,
      hostname: None,
      probe_target: SocketAddr::from(([10, 255, 255, 255], 1)),
      default_shell: DEFAULT_SHELL.to_string(),
      handoff: HandoffMode::default(),
      marker_file: PathBuf::from(DEFAULT_MARKER_PATH),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
  /// Entrypoint baked into rendered layers.
  pub entrypoint: Vec<String>,
  /// Marker location inside the image.
  pub marker_path: PathBuf,
  /// Bootstrapper binary to install. The running executable when unset.
  pub binary: Option<PathBuf>,
  /// Install location of the bootstrapper inside the image.
  pub install_path: PathBuf,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      entrypoint: vec![DEFAULT_INSTALL_PATH.to_string(), "boot".to_string(), "--".to_string()],
      marker_path: PathBuf::from(DEFAULT_MARKER_PATH),
      binary: None,
      install_path: PathBuf::from(DEFAULT_INSTALL_PATH),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Search paths extended by both the rendered layer and the bootstrapper.
  pub search_paths: Vec<SearchPath>,
  pub boot: BootConfig,
  pub build: BuildConfig,
  /// Extra variants on top of the built-in GPU and CPU ones.
  pub variants: Vec<BuildVariant>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      search_paths: vec![SearchPath::new(
        "PYTHONPATH",
        vec!["/opt/ml/code/graphstorm/python".to_string()],
      )],
      boot: BootConfig::default(),
      build: BuildConfig::default(),
      variants: Vec::new(),
    }
  }
}

impl Config {
  /// Load configuration.
  ///
  /// `explicit` (or `GSNODE_CONFIG`) must exist when given. The default location is
  /// optional: when it is missing, built-in defaults are used.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
    let required = explicit.map(Path::to_path_buf).or(from_env);

    let mut config = match required {
      Some(path) => {
        if !path.exists() {
          return Err(ConfigError::NotFound(path));
        }
        Self::from_file(&path)?
      }
      None => {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
          Self::from_file(default_path)?
        } else {
          debug!("no config file, using defaults");
          Self::default()
        }
      }
    };

    config.apply_env_overrides()?;
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loading config");
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Apply `GSNODE_*` environment overrides. Empty values are ignored.
  pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
    if let Some(v) = env_value(ENV_HOSTS_FILE) {
      self.boot.hosts_file = PathBuf::from(v);
    }
    if let Some(v) = env_value(ENV_RESOURCE_CONFIG) {
      self.boot.resource_config = PathBuf::from(v);
    }
    if let Some(v) = env_value(ENV_MARKER_FILE) {
      self.boot.marker_file = PathBuf::from(v);
    }
    if let Some(v) = env_value(ENV_BINARY) {
      self.build.binary = Some(PathBuf::from(v));
    }
    if let Some(v) = env_value(ENV_DEFAULT_SHELL) {
      self.boot.default_shell = v;
    }
    if let Some(v) = env_value(ENV_HOSTNAME_OVERRIDE) {
      self.boot.hostname = Some(v);
    }
    if let Some(v) = env_value(ENV_ADVERTISE_ADDR_OVERRIDE) {
      let addr = v.parse::<IpAddr>().map_err(|e| ConfigError::InvalidEnv {
        var: ENV_ADVERTISE_ADDR_OVERRIDE.to_string(),
        value: v.clone(),
        reason: e.to_string(),
      })?;
      self.boot.advertise_addr = Some(addr);
    }
    if let Some(v) = env_value(ENV_HANDOFF) {
      self.boot.handoff = v.parse().map_err(|reason| ConfigError::InvalidEnv {
        var: ENV_HANDOFF.to_string(),
        value: v.clone(),
        reason,
      })?;
    }
    Ok(())
  }
}

fn env_value(var: &str) -> Option<String> {
  std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
