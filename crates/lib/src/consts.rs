//! Names, paths and exit codes shared by the resolver and the bootstrapper.

pub const APP_NAME: &str = "gsnode";

/// Exit code when Detect or Patch fails before the delegated command starts.
///
/// Above 128 + 64 so it cannot be confused with a signal death reported by a shell.
pub const EXIT_BOOTSTRAP_FAILURE: i32 = 200;

/// Exit code for build-time configuration errors (unknown selector, bad config file).
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Shell conventions for a delegated command that could not be started.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;
pub const EXIT_COMMAND_NOT_EXECUTABLE: i32 = 126;

/// Trailing comment that tags hosts-table lines owned by the bootstrapper.
pub const MANAGED_TAG: &str = "# gsnode";

/// Environment variable and image label carrying the variant marker.
pub const MARKER_KEY: &str = "dev_type";

/// Corrected identity exported to the delegated command.
pub const ENV_NODE_NAME: &str = "GSNODE_NODE_NAME";
pub const ENV_NODE_ADDR: &str = "GSNODE_NODE_ADDR";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/gsnode/gsnode.toml";
pub const DEFAULT_MARKER_PATH: &str = "/etc/gsnode/variant.json";
pub const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";
pub const DEFAULT_RESOURCE_CONFIG: &str = "/opt/ml/input/config/resourceconfig.json";
pub const DEFAULT_SHELL: &str = "/bin/sh";
pub const DEFAULT_INSTALL_PATH: &str = "/usr/local/bin/gsnode";

/// Length of the truncated layer fingerprint.
pub const FINGERPRINT_LEN: usize = 20;

#[cfg(unix)]
pub const SEARCH_PATH_SEPARATOR: char = ':';
#[cfg(windows)]
pub const SEARCH_PATH_SEPARATOR: char = ';';
