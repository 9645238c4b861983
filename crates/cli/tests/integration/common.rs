//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const HOSTNAME: &str = "algo-1";
pub const ADDRESS: &str = "10.0.0.5";

/// Hosts table as the container runtime writes it: hostname on the bridge address.
pub const RUNTIME_HOSTS: &str = "127.0.0.1\tlocalhost\n::1\tlocalhost ip6-localhost\n172.17.0.2\talgo-1\n";

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory with its own config, hosts table,
/// platform resource config and marker paths.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Empty config file and the runtime's hosts table.
  pub fn new() -> Self {
    Self::with_config("")
  }

  pub fn with_config(content: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("gsnode.toml");
    std::fs::write(&config_path, content).unwrap();
    let env = Self { temp, config_path };
    env.write_hosts(RUNTIME_HOSTS);
    env
  }

  /// Create from a fixture file.
  pub fn from_fixture(name: &str) -> Self {
    let content = std::fs::read_to_string(fixture_path(name))
      .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e));
    Self::with_config(&content)
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  fn path(&self, relative_path: &str) -> PathBuf {
    let root = dunce::canonicalize(self.temp.path()).unwrap_or_else(|_| self.temp.path().to_path_buf());
    root.join(relative_path)
  }

  pub fn hosts_path(&self) -> PathBuf {
    self.path("hosts")
  }

  pub fn write_hosts(&self, content: &str) {
    self.write_file("hosts", content);
  }

  pub fn hosts(&self) -> String {
    std::fs::read_to_string(self.hosts_path()).unwrap()
  }

  pub fn resource_config_path(&self) -> PathBuf {
    self.path("resourceconfig.json")
  }

  pub fn marker_path(&self) -> PathBuf {
    self.path("variant.json")
  }

  /// Scratch path for files the delegated command writes.
  pub fn output_path(&self, name: &str) -> PathBuf {
    self.path(name)
  }

  /// Get a pre-configured Command for the gsnode binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `GSNODE_CONFIG`: the per-test config file
  /// - `GSNODE_HOSTS_FILE`: the per-test hosts table
  /// - `GSNODE_RESOURCE_CONFIG`: per-test platform resource config (absent by default)
  /// - `GSNODE_MARKER_FILE`: per-test variant marker (absent by default)
  /// - `GSNODE_HOSTNAME` / `GSNODE_ADVERTISE_ADDR`: fixed identity, no network lookups
  pub fn gsnode_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("gsnode");
    cmd.env("GSNODE_CONFIG", &self.config_path);
    cmd.env("GSNODE_HOSTS_FILE", self.hosts_path());
    cmd.env("GSNODE_RESOURCE_CONFIG", self.resource_config_path());
    cmd.env("GSNODE_MARKER_FILE", self.marker_path());
    cmd.env("GSNODE_HOSTNAME", HOSTNAME);
    cmd.env("GSNODE_ADVERTISE_ADDR", ADDRESS);
    for var in [
      "GSNODE_DEVICE",
      "GSNODE_HANDOFF",
      "GSNODE_DEFAULT_SHELL",
      "GSNODE_BINARY",
      "PYTHONPATH",
      "RUST_LOG",
    ] {
      cmd.env_remove(var);
    }
    cmd
  }
}
