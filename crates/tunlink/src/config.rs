//! Tunnel configuration and persisted session state.
//!
//! A [`TunnelConfig`] says where the tunnel goes; a [`SessionState`] records
//! what was done to the route table so a later process can undo it with the
//! same baseline gateway.
//!
//! ```json
//! {
//!   "server": "203.0.113.5",
//!   "tunnel_gateway": "10.8.0.1",
//!   "syntax": "iproute2"
//! }
//! ```

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::route::{CommandRunner, DEFAULT_PROBE, Gateway, RouteController, RouteSyntax};

fn default_probe() -> Ipv4Addr {
    DEFAULT_PROBE
}

/// Addresses and options for one full-tunnel session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    /// Public address of the tunnel server.
    pub server: Ipv4Addr,
    /// Next hop inside the tunnel.
    pub tunnel_gateway: Ipv4Addr,
    /// Baseline gateway; discovered from the routing table when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Gateway>,
    /// Destination used to discover the baseline gateway.
    #[serde(default = "default_probe")]
    pub probe: Ipv4Addr,
    /// Route command dialect.
    #[serde(default)]
    pub syntax: RouteSyntax,
}

impl TunnelConfig {
    /// Create a configuration with default probe and syntax.
    pub fn new(server: Ipv4Addr, tunnel_gateway: Ipv4Addr) -> Self {
        Self {
            server,
            tunnel_gateway,
            gateway: None,
            probe: DEFAULT_PROBE,
            syntax: RouteSyntax::default(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that every address is a usable unicast host address and that
    /// the server is not one of the gateways.
    pub fn validate(&self) -> Result<()> {
        check_unicast("server", self.server)?;
        check_unicast("tunnel_gateway", self.tunnel_gateway)?;
        check_unicast("probe", self.probe)?;
        if let Some(gateway) = self.gateway {
            check_unicast("gateway", gateway.addr())?;
            if gateway.addr() == self.server {
                return Err(Error::Config(format!(
                    "server {} is the baseline gateway",
                    self.server
                )));
            }
        }
        if self.server == self.tunnel_gateway {
            return Err(Error::Config(format!(
                "server {} is the tunnel gateway",
                self.server
            )));
        }
        Ok(())
    }
}

fn check_unicast(field: &str, addr: Ipv4Addr) -> Result<()> {
    if addr.is_unspecified() || addr.is_broadcast() || addr.is_multicast() {
        return Err(Error::Config(format!(
            "{field} must be a unicast address, got {addr}"
        )));
    }
    Ok(())
}

/// Routes applied by a running session.
///
/// Written after setup succeeds and read back before restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Public address of the tunnel server.
    pub server: Ipv4Addr,
    /// Next hop inside the tunnel.
    pub tunnel_gateway: Ipv4Addr,
    /// Baseline gateway captured at setup.
    pub gateway: Gateway,
    /// Route command dialect used at setup.
    pub syntax: RouteSyntax,
}

impl SessionState {
    /// Write the state as JSON, replacing the file atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), "saved session state");
        Ok(())
    }

    /// Read a state file written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// A controller attached to this session's redirected routes.
    pub fn controller<R: CommandRunner>(&self, runner: R) -> RouteController<R> {
        RouteController::resume(
            self.gateway,
            runner,
            self.syntax,
            self.server,
            self.tunnel_gateway,
        )
    }
}
