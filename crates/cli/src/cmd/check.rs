//! Check command implementation.
//!
//! Runs Detect and compares the result with the hosts table. Nothing is written.

use std::path::Path;

use anyhow::Result;

use gsnode_lib::boot::{Bootstrapper, SystemProbe};

use crate::cmd::load_config;
use crate::output::{print_info, print_json, print_stat, print_success, print_warning, symbols};

pub fn cmd_check(config_path: Option<&Path>, json: bool) -> Result<()> {
  let config = load_config(config_path)?;
  let mut bootstrapper = Bootstrapper::new(&config.boot, &config.search_paths, SystemProbe);
  let plan = bootstrapper.plan()?;

  if json {
    return print_json(&plan);
  }

  print_success(&format!(
    "{} {} {}",
    plan.identity.hostname,
    symbols::ARROW,
    plan.identity.address
  ));
  print_stat("Source", &plan.identity.source.to_string());
  if !plan.identity.aliases.is_empty() {
    print_stat("Aliases", &plan.identity.aliases.join(" "));
  }
  print_stat("Hosts file", &config.boot.hosts_file.display().to_string());
  print_stat("Entry", &plan.correction.patched_entry);

  if plan.needs_patch {
    print_warning("Hosts table needs a patch");
  } else {
    print_info("Hosts table is already correct");
  }
  Ok(())
}
