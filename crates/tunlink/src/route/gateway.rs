//! Default gateway discovery.
//!
//! The gateway is resolved once per tunnel session, before any route is
//! touched, by asking the routing subsystem which path it would pick for
//! arbitrary internet traffic.
//!
//! # Example
//!
//! ```ignore
//! use tunlink::netlink::Connection;
//! use tunlink::route::resolve_default_gateway;
//!
//! let conn = Connection::new()?;
//! let gateway = resolve_default_gateway(&conn).await?;
//! println!("system gateway is {gateway}");
//! ```

use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Probe destination used to discover the default route.
///
/// Any public, always-routable address works; reachability is not tested.
pub const DEFAULT_PROBE: Ipv4Addr = Ipv4Addr::new(8, 8, 8, 8);

/// One forwarding-table row as reported by a best-route query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardRow {
    /// Destination of the matched route.
    pub destination: Ipv4Addr,
    /// Prefix length of the matched route.
    pub prefix_len: u8,
    /// Next hop, absent for directly connected routes.
    pub next_hop: Option<Ipv4Addr>,
    /// Outgoing interface index.
    pub if_index: u32,
    /// Routing table the route was found in.
    pub table: u32,
}

impl ForwardRow {
    /// The prefix length expressed as a dotted netmask.
    pub fn mask(&self) -> Ipv4Addr {
        match self.prefix_len {
            0 => Ipv4Addr::UNSPECIFIED,
            len => Ipv4Addr::from(!0u32 << (32 - u32::from(len.min(32)))),
        }
    }
}

/// A best-route query against the OS routing subsystem.
///
/// Implemented by [`crate::netlink::Connection`]; tests substitute fixed
/// replies.
pub trait BestRouteQuery {
    /// Return the row the OS would use to reach `destination`.
    fn best_route(
        &self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> impl Future<Output = Result<ForwardRow>> + Send;
}

/// The host's pre-tunnel default next hop.
///
/// Captured once at session start and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gateway(Ipv4Addr);

impl Gateway {
    /// Wrap an already known gateway address.
    pub const fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// Get the gateway address.
    pub const fn addr(&self) -> Ipv4Addr {
        self.0
    }
}

impl From<Ipv4Addr> for Gateway {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Resolve the default gateway using [`DEFAULT_PROBE`].
pub async fn resolve_default_gateway<Q: BestRouteQuery>(query: &Q) -> Result<Gateway> {
    resolve_default_gateway_with_probe(query, DEFAULT_PROBE).await
}

/// Resolve the default gateway toward a caller-chosen probe address.
///
/// An unreachable probe, or a route without a next hop, is reported as
/// [`Error::NoRoute`]. Other failures are returned as they occurred.
pub async fn resolve_default_gateway_with_probe<Q: BestRouteQuery>(
    query: &Q,
    probe: Ipv4Addr,
) -> Result<Gateway> {
    let row = match query.best_route(probe, Ipv4Addr::UNSPECIFIED).await {
        Ok(row) => row,
        Err(e) if e.is_unreachable() => return Err(Error::NoRoute { destination: probe }),
        Err(e) => return Err(e),
    };

    match row.next_hop {
        Some(next_hop) if !next_hop.is_unspecified() => {
            tracing::debug!(gateway = %next_hop, if_index = row.if_index, "resolved default gateway");
            Ok(Gateway(next_hop))
        }
        _ => Err(Error::NoRoute { destination: probe }),
    }
}
