//! Boot command: the container entrypoint.
//!
//! Everything here writes to stderr. Stdout belongs to the delegated command.

use std::path::Path;

use gsnode_lib::boot::{BootPlan, Bootstrapper, DelegatedCommand, SystemProbe};
use gsnode_lib::config::Config;
use gsnode_lib::consts::EXIT_BOOTSTRAP_FAILURE;

use crate::output::{eprint_info, eprint_stat, print_error};

/// Returns the process exit code: the delegated command's, or a bootstrap failure code.
pub fn cmd_boot(config_path: Option<&Path>, args: Vec<String>, dry_run: bool) -> i32 {
  let config = match Config::load(config_path) {
    Ok(config) => config,
    Err(e) => {
      print_error(&format!("bootstrap failed: {}", e));
      return EXIT_BOOTSTRAP_FAILURE;
    }
  };

  let command = DelegatedCommand::new(args, &config.boot.default_shell);
  let mut bootstrapper = Bootstrapper::new(&config.boot, &config.search_paths, SystemProbe);

  if dry_run {
    return match bootstrapper.plan() {
      Ok(plan) => {
        print_dry_run(&plan, &command);
        0
      }
      Err(e) => {
        print_error(&format!("bootstrap failed: {}", e));
        e.exit_code()
      }
    };
  }

  bootstrapper.run(command)
}

fn print_dry_run(plan: &BootPlan, command: &DelegatedCommand) {
  if plan.needs_patch {
    eprint_info("Would patch the hosts table");
  } else {
    eprint_info("Hosts table is already correct");
  }
  eprint_stat("Entry", &plan.correction.patched_entry);
  eprint_stat("Source", &plan.identity.source.to_string());
  eprint_stat("Command", &command.argv().join(" "));
}
