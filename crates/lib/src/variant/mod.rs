//! Build-time variant resolution.
//!
//! A single device selector picks one mutually exclusive dependency branch. The
//! branch is rendered into an image layer stamped with a `dev_type` marker.

mod registry;
mod render;
mod types;

pub use registry::VariantRegistry;
pub use render::{
  BINARY_NAME, BuildLayer, DOCKERFILE_NAME, LayerOptions, MARKER_NAME, REQUIREMENTS_NAME, VariantMarker, read_marker, render_layer,
  write_layer,
};
pub use types::{BuildVariant, DependencySpec, VariantError, normalize_selector};
