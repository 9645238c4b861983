//! Node bootstrap: Detect → Patch → Exec.
//!
//! Runs as the container's first process. Detect works out the node's identity,
//! Patch makes the hosts table agree with it, Exec hands the corrected environment
//! to the delegated command. A failure in Detect or Patch ends the run with
//! [`EXIT_BOOTSTRAP_FAILURE`] and the delegated command never starts. There are no
//! retries; the platform's restart policy owns that.

mod detect;
mod exec;
mod hosts;

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{BootConfig, HandoffMode};
use crate::consts::{ENV_NODE_ADDR, ENV_NODE_NAME, EXIT_BOOTSTRAP_FAILURE, MARKER_KEY};
use crate::env::{EnvError, EnvironmentAssembly, SearchPath};
use crate::variant::read_marker;

pub use detect::{AddressSource, DetectError, DetectOptions, Identity, NetworkProbe, ResourceConfig, SystemProbe, detect};
pub use exec::{DelegatedCommand, exit_code, handoff};
pub use hosts::{HostnameCorrection, HostsError, HostsTable, PatchOutcome};

#[derive(Debug, Error)]
pub enum BootError {
  #[error("detect: {0}")]
  Detect(#[from] DetectError),

  #[error("patch: {0}")]
  Patch(#[from] HostsError),

  #[error("environment: {0}")]
  Env(#[from] EnvError),
}

impl BootError {
  pub fn exit_code(&self) -> i32 {
    EXIT_BOOTSTRAP_FAILURE
  }
}

/// Bootstrap progress, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
  Start,
  Detect,
  Patch,
  Exec,
  Terminal,
}

impl fmt::Display for BootState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Start => "start",
      Self::Detect => "detect",
      Self::Patch => "patch",
      Self::Exec => "exec",
      Self::Terminal => "terminal",
    };
    write!(f, "{}", s)
  }
}

/// What Detect found and what Patch would do (or did) about it.
#[derive(Debug, Clone, Serialize)]
pub struct BootPlan {
  pub identity: Identity,
  pub correction: HostnameCorrection,
  pub needs_patch: bool,
}

/// Everything Exec needs. Holds the locked hosts table until the handoff.
#[derive(Debug)]
pub struct Prepared {
  pub plan: BootPlan,
  pub outcome: PatchOutcome,
  pub env: EnvironmentAssembly,
  table: HostsTable,
}

pub struct Bootstrapper<'a, P: NetworkProbe> {
  config: &'a BootConfig,
  search_paths: &'a [SearchPath],
  probe: P,
  state: BootState,
}

impl<'a, P: NetworkProbe> Bootstrapper<'a, P> {
  pub fn new(config: &'a BootConfig, search_paths: &'a [SearchPath], probe: P) -> Self {
    Self {
      config,
      search_paths,
      probe,
      state: BootState::Start,
    }
  }

  pub fn state(&self) -> BootState {
    self.state
  }

  fn enter(&mut self, state: BootState) {
    info!(from = %self.state, to = %state, "bootstrap state");
    self.state = state;
  }

  /// Run the whole sequence and return the process exit code.
  pub fn run(mut self, command: DelegatedCommand) -> i32 {
    match self.prepare() {
      Ok(prepared) => self.exec(prepared, &command),
      Err(e) => {
        error!(state = %self.state, error = %e, "bootstrap failed");
        self.enter(BootState::Terminal);
        e.exit_code()
      }
    }
  }

  /// Detect the identity of this node.
  pub fn detect(&mut self) -> Result<Identity, BootError> {
    self.enter(BootState::Detect);
    let opts = DetectOptions {
      hostname: self.config.hostname.as_deref(),
      advertise_addr: self.config.advertise_addr,
      resource_config: &self.config.resource_config,
      probe_target: self.config.probe_target,
    };
    Ok(detect(&self.probe, &opts)?)
  }

  /// Detect, then compare against the hosts table without changing anything.
  pub fn plan(&mut self) -> Result<BootPlan, BootError> {
    let identity = self.detect()?;
    let correction = HostnameCorrection::for_identity(&identity);
    let content = HostsTable::read(&self.config.hosts_file)?;
    let needs_patch = hosts::needs_patch(&content, &correction);
    Ok(BootPlan {
      identity,
      correction,
      needs_patch,
    })
  }

  /// Detect and Patch, and assemble the delegated command's environment.
  pub fn prepare(&mut self) -> Result<Prepared, BootError> {
    let identity = self.detect()?;
    let correction = HostnameCorrection::for_identity(&identity);

    self.enter(BootState::Patch);
    let mut table = HostsTable::acquire(&self.config.hosts_file)?;
    let needs_patch = table.needs_patch(&correction);
    let outcome = table.apply(&correction)?;

    let env = self.environment(&identity)?;

    Ok(Prepared {
      plan: BootPlan {
        identity,
        correction,
        needs_patch,
      },
      outcome,
      env,
      table,
    })
  }

  /// Process environment plus the corrected identity and search-path entries.
  pub fn environment(&self, identity: &Identity) -> Result<EnvironmentAssembly, BootError> {
    let mut env = EnvironmentAssembly::from_process();
    env.set(ENV_NODE_NAME, identity.hostname.clone())?;
    env.set(ENV_NODE_ADDR, identity.address.to_string())?;

    match read_marker(&self.config.marker_file) {
      Ok(Some(marker)) => env.set(MARKER_KEY, marker.dev_type)?,
      Ok(None) => {}
      Err(e) => warn!(error = %e, "ignoring unreadable variant marker"),
    }

    for path in self.search_paths {
      env.extend_path(path)?;
    }
    Ok(env)
  }

  /// Hand off to `command`.
  pub fn exec(mut self, prepared: Prepared, command: &DelegatedCommand) -> i32 {
    self.enter(BootState::Exec);
    let Prepared { env, table, .. } = prepared;

    let code = match self.config.handoff {
      // The lock is released by the exec itself.
      HandoffMode::Replace => {
        let code = handoff(command, &env, HandoffMode::Replace);
        drop(table);
        code
      }
      HandoffMode::Supervise => {
        drop(table);
        handoff(command, &env, HandoffMode::Supervise)
      }
    };

    self.enter(BootState::Terminal);
    code
  }
}
