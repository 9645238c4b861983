mod boot;
mod check;
mod info;
mod resolve;
mod variants;

pub use boot::cmd_boot;
pub use check::cmd_check;
pub use info::cmd_info;
pub use resolve::cmd_resolve;
pub use variants::cmd_variants;

use std::path::Path;

use gsnode_lib::boot::BootError;
use gsnode_lib::config::{Config, ConfigError};
use gsnode_lib::consts::EXIT_CONFIG_ERROR;
use gsnode_lib::variant::VariantError;

pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
  Ok(Config::load(path)?)
}

/// Exit code for a failed command.
pub fn error_exit_code(err: &anyhow::Error) -> i32 {
  if let Some(e) = err.downcast_ref::<BootError>() {
    return e.exit_code();
  }
  if err.is::<VariantError>() || err.is::<ConfigError>() {
    return EXIT_CONFIG_ERROR;
  }
  1
}
