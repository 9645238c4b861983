use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors raised while resolving or rendering a build variant.
///
/// None of these are retried: the image build stops and produces nothing.
#[derive(Debug, Error)]
pub enum VariantError {
  #[error("no device selector given")]
  MissingSelector,

  #[error("unknown device selector '{selector}' (known: {})", known.join(", "))]
  UnknownSelector { selector: String, known: Vec<String> },

  #[error("variant '{selector}' lists package '{package}' more than once")]
  DuplicatePackage { selector: String, package: String },

  #[error("invalid variant '{selector}': {reason}")]
  InvalidVariant { selector: String, reason: String },

  #[error("entrypoint runs {0} but no bootstrapper binary was given to install there")]
  MissingBinary(PathBuf),

  #[error("output directory already exists: {0} (pass --force to replace it)")]
  OutputExists(PathBuf),

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to read marker {path}: {source}")]
  ReadMarker {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse marker {path}: {source}")]
  ParseMarker {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize layer: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// One pinned package and the index it is installed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencySpec {
  pub name: String,
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub index: Option<String>,
}

impl DependencySpec {
  pub fn new(name: &str, version: &str, index: Option<&str>) -> Self {
    Self {
      name: name.to_string(),
      version: version.to_string(),
      index: index.map(str::to_string),
    }
  }

  /// Package name folded the way Python package indexes compare names.
  pub fn normalized_name(&self) -> String {
    let mut out = String::with_capacity(self.name.len());
    let mut last_dash = false;
    for c in self.name.trim().chars() {
      if matches!(c, '-' | '_' | '.') {
        if !last_dash {
          out.push('-');
        }
        last_dash = true;
      } else {
        out.extend(c.to_lowercase());
        last_dash = false;
      }
    }
    out
  }

  /// `name==version` requirement line.
  pub fn requirement(&self) -> String {
    format!("{}=={}", self.name, self.version)
  }
}

/// A mutually exclusive, hardware-targeted dependency set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildVariant {
  /// Token accepted on the command line, stored lowercase.
  pub selector: String,
  /// Marker value recorded in the image as `dev_type`.
  pub label: String,
  pub base_image: String,
  #[serde(default)]
  pub dependencies: Vec<DependencySpec>,
}

/// Normalize a selector token for lookup.
pub fn normalize_selector(selector: &str) -> String {
  selector.trim().to_ascii_lowercase()
}
