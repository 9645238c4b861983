//! Resolve command implementation.
//!
//! Maps a device selector to exactly one build variant and writes its layer
//! (Dockerfile, requirements, marker, bootstrapper binary). Nothing is written when
//! resolution fails.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use gsnode_lib::config::ENV_DEVICE;
use gsnode_lib::variant::{LayerOptions, VariantRegistry, render_layer, write_layer};

use crate::cmd::load_config;
use crate::output::{print_json, print_stat, print_success, truncate_hash};

pub fn cmd_resolve(config_path: Option<&Path>, selector: Option<String>, out: &Path, force: bool, json: bool) -> Result<()> {
  let config = load_config(config_path)?;

  let selector = selector
    .or_else(|| std::env::var(ENV_DEVICE).ok())
    .unwrap_or_default();
  debug!(selector = %selector, "resolving variant");

  let registry = VariantRegistry::with_declarations(&config.variants)?;
  let variant = registry.resolve(&selector)?;

  let binary = match &config.build.binary {
    Some(path) => path.clone(),
    None => std::env::current_exe().context("failed to locate the running gsnode binary")?,
  };
  debug!(binary = %binary.display(), "staging bootstrapper");

  let opts = LayerOptions {
    search_paths: &config.search_paths,
    entrypoint: &config.build.entrypoint,
    marker_path: &config.build.marker_path,
    binary: Some(&binary),
    install_path: &config.build.install_path,
  };
  let layer = render_layer(variant, &opts)?;
  let out_dir = write_layer(&layer, out, force)?;

  if json {
    print_json(&serde_json::json!({ "out_dir": out_dir, "marker": layer.marker }))?;
  } else {
    print_success(&format!("Resolved '{}' to {}", variant.selector, layer.marker.dev_type));
    print_stat("Base image", &variant.base_image);
    print_stat("Dependencies", &variant.dependencies.len().to_string());
    print_stat("Fingerprint", truncate_hash(&layer.marker.fingerprint.0));
    print_stat("Output", &out_dir.display().to_string());
  }

  Ok(())
}
