//! Variant lookup.
//!
//! The registry is an open enumeration: it is closed over the variants it currently
//! knows, and every other selector takes the same error path. New accelerators are
//! added by declaring them, never by changing [`VariantRegistry::resolve`].

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::types::{BuildVariant, DependencySpec, VariantError, normalize_selector};

const PYTORCH_TRAINING_REPO: &str = "763104351884.dkr.ecr.us-east-1.amazonaws.com/pytorch-training";
const DGL_VERSION: &str = "1.0.4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRegistry {
  variants: BTreeMap<String, BuildVariant>,
}

impl VariantRegistry {
  /// Registry with no variants at all. Every selector is rejected.
  pub fn empty() -> Self {
    Self {
      variants: BTreeMap::new(),
    }
  }

  /// The GPU and CPU variants.
  pub fn builtin() -> Self {
    let mut registry = Self::empty();

    registry.variants.insert(
      "gpu".to_string(),
      BuildVariant {
        selector: "gpu".to_string(),
        label: "GPU".to_string(),
        base_image: format!("{}:1.13.1-gpu-py39-cu117-ubuntu20.04-sagemaker", PYTORCH_TRAINING_REPO),
        dependencies: vec![DependencySpec::new(
          "dgl",
          &format!("{}+cu117", DGL_VERSION),
          Some("https://data.dgl.ai/wheels/cu117/repo.html"),
        )],
      },
    );

    registry.variants.insert(
      "cpu".to_string(),
      BuildVariant {
        selector: "cpu".to_string(),
        label: "CPU".to_string(),
        base_image: format!("{}:1.13.1-cpu-py39-ubuntu20.04-sagemaker", PYTORCH_TRAINING_REPO),
        dependencies: vec![DependencySpec::new(
          "dgl",
          DGL_VERSION,
          Some("https://data.dgl.ai/wheels/repo.html"),
        )],
      },
    );

    registry
  }

  /// Built-in variants plus `declared` ones. A declaration with a known selector
  /// replaces the built-in variant.
  pub fn with_declarations(declared: &[BuildVariant]) -> Result<Self, VariantError> {
    let mut registry = Self::builtin();
    for variant in declared {
      registry.register(variant.clone())?;
    }
    Ok(registry)
  }

  /// Validate and insert a variant.
  pub fn register(&mut self, mut variant: BuildVariant) -> Result<(), VariantError> {
    variant.selector = normalize_selector(&variant.selector);
    validate(&variant)?;

    debug!(selector = %variant.selector, label = %variant.label, "registering variant");
    self.variants.insert(variant.selector.clone(), variant);
    Ok(())
  }

  /// Map a selector to exactly one variant, or fail closed.
  pub fn resolve(&self, selector: &str) -> Result<&BuildVariant, VariantError> {
    let key = normalize_selector(selector);
    if key.is_empty() {
      return Err(VariantError::MissingSelector);
    }

    self.variants.get(&key).ok_or_else(|| VariantError::UnknownSelector {
      selector: selector.trim().to_string(),
      known: self.selectors().into_iter().map(str::to_string).collect(),
    })
  }

  pub fn selectors(&self) -> Vec<&str> {
    self.variants.keys().map(String::as_str).collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = &BuildVariant> {
    self.variants.values()
  }

  pub fn len(&self) -> usize {
    self.variants.len()
  }

  pub fn is_empty(&self) -> bool {
    self.variants.is_empty()
  }
}

impl Default for VariantRegistry {
  fn default() -> Self {
    Self::builtin()
  }
}

fn validate(variant: &BuildVariant) -> Result<(), VariantError> {
  let invalid = |reason: &str| VariantError::InvalidVariant {
    selector: variant.selector.clone(),
    reason: reason.to_string(),
  };

  if variant.selector.is_empty() {
    return Err(invalid("selector is empty"));
  }
  if !variant
    .selector
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
  {
    return Err(invalid("selector may only contain letters, digits, '-' and '_'"));
  }
  if variant.label.trim().is_empty() || variant.label.chars().any(char::is_whitespace) {
    return Err(invalid("label must be a single non-empty word"));
  }
  if variant.base_image.trim().is_empty() {
    return Err(invalid("base image is empty"));
  }

  let mut seen = HashSet::new();
  for dep in &variant.dependencies {
    if dep.name.trim().is_empty() || dep.version.trim().is_empty() {
      return Err(invalid("dependency name and version must be set"));
    }
    if !seen.insert(dep.normalized_name()) {
      return Err(VariantError::DuplicatePackage {
        selector: variant.selector.clone(),
        package: dep.name.clone(),
      });
    }
  }

  Ok(())
}
