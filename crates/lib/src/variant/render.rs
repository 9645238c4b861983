//! Rendering a resolved variant into an image build layer.
//!
//! # Output layout
//!
//! ```text
//! {out_dir}/
//! ├── Dockerfile        # FROM, marker ENV/LABEL, installs, search paths, entrypoint
//! ├── requirements.txt  # pinned dependency set of the chosen branch
//! ├── variant.json      # VariantMarker, copied into the image
//! └── gsnode            # bootstrapper binary, installed as the entrypoint
//! ```
//!
//! The directory is assembled in a sibling staging directory and renamed into place,
//! so a failed resolution leaves nothing behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{APP_NAME, MARKER_KEY};
use crate::env::SearchPath;
use crate::util::hash::{Fingerprint, Hashable};

use super::types::{BuildVariant, DependencySpec, VariantError};

pub const DOCKERFILE_NAME: &str = "Dockerfile";
pub const REQUIREMENTS_NAME: &str = "requirements.txt";
pub const MARKER_NAME: &str = "variant.json";
pub const BINARY_NAME: &str = "gsnode";

/// Record of which branch an image was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantMarker {
  pub dev_type: String,
  pub selector: String,
  pub base_image: String,
  pub dependencies: Vec<DependencySpec>,
  pub fingerprint: Fingerprint,
}

#[derive(Serialize)]
struct MarkerContent<'a> {
  dev_type: &'a str,
  selector: &'a str,
  base_image: &'a str,
  dependencies: &'a [DependencySpec],
}

impl Hashable for MarkerContent<'_> {}

impl VariantMarker {
  pub fn for_variant(variant: &BuildVariant) -> Result<Self, VariantError> {
    let fingerprint = MarkerContent {
      dev_type: &variant.label,
      selector: &variant.selector,
      base_image: &variant.base_image,
      dependencies: &variant.dependencies,
    }
    .fingerprint()?;

    Ok(Self {
      dev_type: variant.label.clone(),
      selector: variant.selector.clone(),
      base_image: variant.base_image.clone(),
      dependencies: variant.dependencies.clone(),
      fingerprint,
    })
  }
}

/// What the rendered layer needs besides the variant itself.
#[derive(Debug, Clone)]
pub struct LayerOptions<'a> {
  /// Search paths appended with `ENV`, preserving whatever earlier layers set.
  pub search_paths: &'a [SearchPath],
  /// Image entrypoint (the bootstrapper invocation).
  pub entrypoint: &'a [String],
  /// Where the marker is copied inside the image.
  pub marker_path: &'a Path,
  /// Bootstrapper binary on the build host, staged next to the Dockerfile.
  pub binary: Option<&'a Path>,
  /// Where the bootstrapper binary is installed inside the image.
  pub install_path: &'a Path,
}

/// A fully rendered layer, not yet written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayer {
  pub marker: VariantMarker,
  pub dockerfile: String,
  pub requirements: String,
  /// Binary copied into the build context as [`BINARY_NAME`].
  pub binary: Option<PathBuf>,
}

/// Render `variant` into a layer.
///
/// Fails with [`VariantError::MissingBinary`] when the entrypoint runs the installed
/// bootstrapper but no binary was given to install.
pub fn render_layer(variant: &BuildVariant, opts: &LayerOptions<'_>) -> Result<BuildLayer, VariantError> {
  let runs_bootstrapper = opts
    .entrypoint
    .first()
    .is_some_and(|program| Path::new(program) == opts.install_path);
  if runs_bootstrapper && opts.binary.is_none() {
    return Err(VariantError::MissingBinary(opts.install_path.to_path_buf()));
  }

  let marker = VariantMarker::for_variant(variant)?;

  let mut dockerfile = String::new();
  dockerfile.push_str(&format!(
    "# Generated by {} {} for variant '{}'\n",
    APP_NAME,
    env!("CARGO_PKG_VERSION"),
    variant.selector
  ));
  dockerfile.push_str(&format!("FROM {}\n\n", variant.base_image));
  dockerfile.push_str(&format!("ENV {}={}\n", MARKER_KEY, variant.label));
  dockerfile.push_str(&format!(
    "LABEL {}=\"{}\" {}.fingerprint=\"{}\"\n\n",
    MARKER_KEY, variant.label, APP_NAME, marker.fingerprint
  ));

  for (index, deps) in group_by_index(&variant.dependencies) {
    let requirements: Vec<String> = deps.iter().map(|d| d.requirement()).collect();
    match index {
      Some(index) => dockerfile.push_str(&format!(
        "RUN pip3 install --no-cache-dir -f {} {}\n",
        index,
        requirements.join(" ")
      )),
      None => dockerfile.push_str(&format!("RUN pip3 install --no-cache-dir {}\n", requirements.join(" "))),
    }
  }

  dockerfile.push_str(&format!("\nCOPY {} {}\n", MARKER_NAME, opts.marker_path.display()));
  if opts.binary.is_some() {
    dockerfile.push_str(&format!("COPY {} {}\n", BINARY_NAME, opts.install_path.display()));
  }

  for path in opts.search_paths {
    if path.entries.is_empty() {
      continue;
    }
    dockerfile.push_str(&format!("{}\n", additive_env_line(path)));
  }

  if !opts.entrypoint.is_empty() {
    dockerfile.push_str(&format!("\nENTRYPOINT {}\n", serde_json::to_string(opts.entrypoint)?));
  }

  let requirements = render_requirements(variant);

  debug!(selector = %variant.selector, deps = variant.dependencies.len(), "rendered layer");

  Ok(BuildLayer {
    marker,
    dockerfile,
    requirements,
    binary: opts.binary.map(Path::to_path_buf),
  })
}

/// `ENV VAR="${VAR:+${VAR}:}a:b"`: appends without a stray separator when unset.
fn additive_env_line(path: &SearchPath) -> String {
  format!(
    "ENV {var}=\"${{{var}:+${{{var}}}:}}{entries}\"",
    var = path.var,
    entries = path.entries.join(":")
  )
}

fn render_requirements(variant: &BuildVariant) -> String {
  let mut out = format!("# {}={}\n", MARKER_KEY, variant.label);
  for (index, deps) in group_by_index(&variant.dependencies) {
    if let Some(index) = index {
      out.push_str(&format!("--find-links {}\n", index));
    }
    for dep in deps {
      out.push_str(&dep.requirement());
      out.push('\n');
    }
  }
  out
}

/// Group dependencies by source index, keeping first-appearance order.
fn group_by_index(deps: &[DependencySpec]) -> Vec<(Option<&str>, Vec<&DependencySpec>)> {
  let mut groups: Vec<(Option<&str>, Vec<&DependencySpec>)> = Vec::new();
  for dep in deps {
    let index = dep.index.as_deref();
    match groups.iter_mut().find(|(i, _)| *i == index) {
      Some((_, members)) => members.push(dep),
      None => groups.push((index, vec![dep])),
    }
  }
  groups
}

/// Write `layer` to `out_dir`.
///
/// Fails with [`VariantError::OutputExists`] when `out_dir` exists and is not empty,
/// unless `force` is set.
pub fn write_layer(layer: &BuildLayer, out_dir: &Path, force: bool) -> Result<PathBuf, VariantError> {
  let write_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source: io::Error| VariantError::Write { path, source }
  };

  let parent = match out_dir.parent() {
    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
    _ => PathBuf::from("."),
  };
  fs::create_dir_all(&parent).map_err(write_err(&parent))?;

  let staging = tempfile::Builder::new()
    .prefix(&format!(".{}-layer", APP_NAME))
    .tempdir_in(&parent)
    .map_err(write_err(&parent))?;

  let files = [
    (DOCKERFILE_NAME, layer.dockerfile.clone()),
    (REQUIREMENTS_NAME, layer.requirements.clone()),
    (MARKER_NAME, serde_json::to_string_pretty(&layer.marker)?),
  ];
  for (name, content) in files {
    let path = staging.path().join(name);
    fs::write(&path, content).map_err(write_err(&path))?;
  }
  if let Some(binary) = &layer.binary {
    fs::copy(binary, staging.path().join(BINARY_NAME)).map_err(write_err(binary))?;
  }

  if out_dir.exists() {
    let is_empty_dir = fs::read_dir(out_dir)
      .map(|mut entries| entries.next().is_none())
      .unwrap_or(false);
    if !is_empty_dir && !force {
      return Err(VariantError::OutputExists(out_dir.to_path_buf()));
    }
    if out_dir.is_dir() {
      fs::remove_dir_all(out_dir).map_err(write_err(out_dir))?;
    } else {
      fs::remove_file(out_dir).map_err(write_err(out_dir))?;
    }
  }

  fs::rename(staging.path(), out_dir).map_err(write_err(out_dir))?;

  info!(path = %out_dir.display(), dev_type = %layer.marker.dev_type, "layer written");
  Ok(out_dir.to_path_buf())
}

/// Read the marker recorded in an image. Returns `Ok(None)` when there is none.
pub fn read_marker(path: &Path) -> Result<Option<VariantMarker>, VariantError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(VariantError::ReadMarker {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  serde_json::from_str(&content)
    .map(Some)
    .map_err(|source| VariantError::ParseMarker {
      path: path.to_path_buf(),
      source,
    })
}
