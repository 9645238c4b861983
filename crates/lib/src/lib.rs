//! gsnode-lib: build variants and node bootstrap for distributed training images.
//!
//! - `variant`: resolve a device selector to exactly one dependency branch and render
//!   it as an image layer stamped with a `dev_type` marker
//! - `boot`: the container's first process; corrects the node's hostname mapping
//!   and hands off to the training command
//! - `env`: ordered, additive environment assembly shared by both
//! - `config`: TOML + environment configuration

pub mod boot;
pub mod config;
pub mod consts;
pub mod env;
pub mod util;
pub mod variant;
