//! Detect: who is this container and which address does the network give it.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DetectError {
  #[error("failed to read hostname: {0}")]
  Hostname(#[source] io::Error),

  #[error("invalid hostname {0:?}")]
  InvalidHostname(String),

  #[error("failed to read resource config {path}: {source}")]
  ReadResourceConfig {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse resource config {path}: {source}")]
  ParseResourceConfig {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("address {addr} from {source_kind} is not routable")]
  Unusable { addr: IpAddr, source_kind: AddressSource },

  #[error("no network address found (tried: {})", attempts.join("; "))]
  NoAddress { attempts: Vec<String> },
}

/// Where the advertised address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
  Override,
  PlatformDns,
  RouteProbe,
}

impl fmt::Display for AddressSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Override => "override",
      Self::PlatformDns => "platform dns",
      Self::RouteProbe => "route probe",
    };
    write!(f, "{}", s)
  }
}

/// The container's identity as the rest of the cluster should see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub hostname: String,
  /// Other names peers use for this node, e.g. the platform's `current_host`.
  pub aliases: Vec<String>,
  pub address: IpAddr,
  pub source: AddressSource,
}

impl Identity {
  /// Hostname followed by aliases.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.hostname.as_str()).chain(self.aliases.iter().map(String::as_str))
  }
}

/// Platform resource config, as mounted into training containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
  pub current_host: String,
  #[serde(default)]
  pub hosts: Vec<String>,
  #[serde(default)]
  pub network_interface_name: Option<String>,
}

impl ResourceConfig {
  /// Returns `Ok(None)` when the file does not exist.
  pub fn load(path: &Path) -> Result<Option<Self>, DetectError> {
    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(DetectError::ReadResourceConfig {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    serde_json::from_str(&content)
      .map(Some)
      .map_err(|source| DetectError::ParseResourceConfig {
        path: path.to_path_buf(),
        source,
      })
  }
}

/// Host-level queries Detect depends on.
pub trait NetworkProbe {
  fn hostname(&self) -> io::Result<String>;

  fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;

  /// Local address the kernel would use to reach `target`.
  fn route_address(&self, target: SocketAddr) -> io::Result<IpAddr>;
}

/// [`NetworkProbe`] backed by the running kernel and system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl NetworkProbe for SystemProbe {
  #[cfg(unix)]
  fn hostname(&self) -> io::Result<String> {
    let uname = rustix::system::uname();
    Ok(uname.nodename().to_string_lossy().into_owned())
  }

  #[cfg(not(unix))]
  fn hostname(&self) -> io::Result<String> {
    std::env::var("COMPUTERNAME").map_err(io::Error::other)
  }

  fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
    Ok((host, 0u16).to_socket_addrs()?.map(|a| a.ip()).collect())
  }

  fn route_address(&self, target: SocketAddr) -> io::Result<IpAddr> {
    let bind: SocketAddr = match target {
      SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
      SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    };
    // UDP connect only selects a route; no datagram is sent.
    let socket = UdpSocket::bind(bind)?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
  }
}

#[derive(Debug, Clone)]
pub struct DetectOptions<'a> {
  pub hostname: Option<&'a str>,
  pub advertise_addr: Option<IpAddr>,
  pub resource_config: &'a Path,
  pub probe_target: SocketAddr,
}

pub fn detect(probe: &dyn NetworkProbe, opts: &DetectOptions<'_>) -> Result<Identity, DetectError> {
  let hostname = match opts.hostname {
    Some(h) => h.to_string(),
    None => probe.hostname().map_err(DetectError::Hostname)?,
  };
  let hostname = validate_hostname(hostname.trim())?;

  let resource = ResourceConfig::load(opts.resource_config)?;
  let platform_host = match &resource {
    Some(rc) => Some(validate_hostname(rc.current_host.trim())?),
    None => None,
  };

  let aliases: Vec<String> = platform_host
    .iter()
    .filter(|h| !h.eq_ignore_ascii_case(&hostname))
    .cloned()
    .collect();

  let (address, source) = resolve_address(probe, opts, platform_host.as_deref())?;

  debug!(hostname = %hostname, address = %address, source = %source, "identity detected");

  Ok(Identity {
    hostname,
    aliases,
    address,
    source,
  })
}

fn resolve_address(
  probe: &dyn NetworkProbe,
  opts: &DetectOptions<'_>,
  platform_host: Option<&str>,
) -> Result<(IpAddr, AddressSource), DetectError> {
  if let Some(addr) = opts.advertise_addr {
    if !is_routable(&addr) {
      return Err(DetectError::Unusable {
        addr,
        source_kind: AddressSource::Override,
      });
    }
    return Ok((addr, AddressSource::Override));
  }

  let mut attempts = Vec::new();

  if let Some(host) = platform_host {
    match probe.lookup(host) {
      Ok(addrs) => match pick_address(&addrs) {
        Some(addr) => return Ok((addr, AddressSource::PlatformDns)),
        None => attempts.push(format!("{} resolved to no routable address", host)),
      },
      Err(e) => {
        warn!(host = %host, error = %e, "platform host lookup failed");
        attempts.push(format!("lookup {}: {}", host, e));
      }
    }
  } else {
    attempts.push("no platform resource config".to_string());
  }

  match probe.route_address(opts.probe_target) {
    Ok(addr) if is_routable(&addr) => return Ok((addr, AddressSource::RouteProbe)),
    Ok(addr) => attempts.push(format!("route probe returned {}", addr)),
    Err(e) => attempts.push(format!("route probe via {}: {}", opts.probe_target, e)),
  }

  Err(DetectError::NoAddress { attempts })
}

/// First routable IPv4 address, else the first routable IPv6 one.
fn pick_address(addrs: &[IpAddr]) -> Option<IpAddr> {
  let routable = || addrs.iter().filter(|a| is_routable(a));
  routable()
    .find(|a| a.is_ipv4())
    .or_else(|| routable().next())
    .copied()
}

fn is_routable(addr: &IpAddr) -> bool {
  !addr.is_loopback() && !addr.is_unspecified() && !addr.is_multicast()
}

fn validate_hostname(name: &str) -> Result<String, DetectError> {
  let valid = !name.is_empty()
    && name.len() <= 253
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
  if !valid {
    return Err(DetectError::InvalidHostname(name.to_string()));
  }
  Ok(name.to_string())
}
