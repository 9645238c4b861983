use std::path::Path;

use anyhow::Result;

use gsnode_lib::variant::VariantRegistry;

use crate::cmd::load_config;
use crate::output::{print_json, symbols};

pub fn cmd_variants(config_path: Option<&Path>, json: bool) -> Result<()> {
  let config = load_config(config_path)?;
  let registry = VariantRegistry::with_declarations(&config.variants)?;

  if json {
    let variants: Vec<_> = registry.iter().collect();
    return print_json(&variants);
  }

  for variant in registry.iter() {
    println!(
      "  {} {} {} {} ({} dependencies)",
      symbols::INFO,
      variant.selector,
      symbols::ARROW,
      variant.label,
      variant.dependencies.len()
    );
  }
  Ok(())
}
