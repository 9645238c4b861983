//! Info command: the variant marker recorded in the running image.

use std::path::Path;

use anyhow::Result;

use gsnode_lib::variant::read_marker;

use crate::cmd::load_config;
use crate::output::{print_info, print_json, print_stat, print_success};

pub fn cmd_info(config_path: Option<&Path>, json: bool) -> Result<()> {
  let config = load_config(config_path)?;
  let marker_file = &config.boot.marker_file;
  let marker = read_marker(marker_file)?;

  if json {
    return print_json(&serde_json::json!({ "marker_file": marker_file, "marker": marker }));
  }

  match marker {
    Some(marker) => {
      print_success(&format!("dev_type={}", marker.dev_type));
      print_stat("Selector", &marker.selector);
      print_stat("Base image", &marker.base_image);
      print_stat("Fingerprint", &marker.fingerprint.0);
      for dep in &marker.dependencies {
        print_stat("Requires", &dep.requirement());
      }
    }
    None => print_info(&format!("No variant marker at {}", marker_file.display())),
  }
  Ok(())
}
