//! Route transitions and UDP control-message plumbing for tunnel clients.
//!
//! This crate holds the platform-facing pieces a full-tunnel VPN client needs
//! on Linux:
//!
//! - [`route`] discovers the host's default gateway and moves the route
//!   table into and out of tunnel mode.
//! - [`netlink`] is the small RTNetlink client behind gateway discovery.
//! - [`cmsg`] reads and writes the socket control messages exchanged with the
//!   kernel on every datagram (sticky source address, UDP GSO/GRO).
//! - [`config`] loads tunnel settings and persists session state.
//!
//! # Example
//!
//! ```ignore
//! use tunlink::netlink::Connection;
//! use tunlink::route::{ProcessRunner, RouteController, RouteSyntax, resolve_default_gateway};
//!
//! #[tokio::main]
//! async fn main() -> tunlink::Result<()> {
//!     let gateway = resolve_default_gateway(&Connection::new()?).await?;
//!     let mut routes = RouteController::new(gateway, ProcessRunner, RouteSyntax::Iproute2);
//!
//!     routes.establish_and_redirect(server, tunnel_gateway).await?;
//!     // ... run the tunnel ...
//!     routes.restore(tunnel_gateway, server).await?;
//!     Ok(())
//! }
//! ```

pub mod cmsg;
pub mod config;
pub mod error;
pub mod netlink;
pub mod route;

pub use error::{Error, Result};
