//! Ordered environment assembly.
//!
//! Both the resolver (baking `ENV` lines into a layer) and the bootstrapper (building
//! the delegated command's environment) assemble variables incrementally. Insertion
//! order is kept, and search-path variables only ever grow at the end.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::SEARCH_PATH_SEPARATOR;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
  #[error("invalid environment variable name: {0:?}")]
  InvalidName(String),

  #[error("invalid entry {entry:?} for search path {var}")]
  InvalidEntry { var: String, entry: String },
}

/// A search-path variable and the entries a component appends to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchPath {
  pub var: String,
  pub entries: Vec<String>,
}

impl SearchPath {
  pub fn new(var: impl Into<String>, entries: Vec<String>) -> Self {
    Self {
      var: var.into(),
      entries,
    }
  }
}

/// Ordered mapping from variable name to value.
///
/// Values are kept as OS strings, so inherited variables pass through byte for byte
/// whether or not they are valid UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentAssembly {
  vars: Vec<(OsString, OsString)>,
}

impl EnvironmentAssembly {
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of the current process environment.
  pub fn from_process() -> Self {
    Self {
      vars: std::env::vars_os().collect(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&OsStr> {
    self
      .vars
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_os_str())
  }

  /// Like [`get`](Self::get), for values that are valid UTF-8.
  pub fn get_str(&self, name: &str) -> Option<&str> {
    self.get(name).and_then(OsStr::to_str)
  }

  /// Set `name`, keeping its original position when it already exists.
  pub fn set(&mut self, name: &str, value: impl Into<OsString>) -> Result<(), EnvError> {
    validate_name(name)?;
    let value = value.into();
    match self.vars.iter_mut().find(|(k, _)| k == name) {
      Some((_, v)) => *v = value,
      None => self.vars.push((OsString::from(name), value)),
    }
    Ok(())
  }

  /// Append `entry` to the search path `name`.
  ///
  /// The existing value is kept verbatim, including empty segments and bytes that are
  /// not UTF-8, and the new entry goes after it. Returns `false` when the entry is
  /// already present.
  pub fn append_path(&mut self, name: &str, entry: &str) -> Result<bool, EnvError> {
    if entry.is_empty() || entry.contains(SEARCH_PATH_SEPARATOR) {
      return Err(EnvError::InvalidEntry {
        var: name.to_string(),
        entry: entry.to_string(),
      });
    }

    let updated = match self.get(name) {
      Some(existing) if std::env::split_paths(existing).any(|e| e.as_os_str() == OsStr::new(entry)) => {
        return Ok(false);
      }
      Some(existing) if !existing.is_empty() => {
        let mut value = existing.to_os_string();
        value.push(SEARCH_PATH_SEPARATOR.to_string());
        value.push(entry);
        value
      }
      _ => OsString::from(entry),
    };

    self.set(name, updated)?;
    Ok(true)
  }

  /// Append every entry of `path`, in order.
  pub fn extend_path(&mut self, path: &SearchPath) -> Result<(), EnvError> {
    for entry in &path.entries {
      self.append_path(&path.var, entry)?;
    }
    Ok(())
  }

  /// Entries of a search-path variable, in order. Empty segments are omitted.
  pub fn path_entries(&self, name: &str) -> Vec<PathBuf> {
    self
      .get(name)
      .map(|v| std::env::split_paths(v).filter(|e| !e.as_os_str().is_empty()).collect())
      .unwrap_or_default()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
    self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }
}

fn validate_name(name: &str) -> Result<(), EnvError> {
  if name.is_empty() || name.contains('=') || name.contains('\0') {
    return Err(EnvError::InvalidName(name.to_string()));
  }
  Ok(())
}
