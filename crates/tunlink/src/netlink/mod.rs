//! Minimal RTNetlink client for best-route lookups.
//!
//! Only what gateway discovery needs: an async `NETLINK_ROUTE` socket, the
//! message/attribute framing, and the `RTM_GETROUTE` request and reply.
//!
//! ```ignore
//! use tunlink::netlink::Connection;
//! use std::net::Ipv4Addr;
//!
//! let conn = Connection::new()?;
//! let row = conn.get_route(Ipv4Addr::new(8, 8, 8, 8)).await?;
//! ```

pub mod attr;
mod builder;
pub mod connection;
pub mod message;
pub mod route;
mod socket;

pub use attr::{AttrIter, NlAttr};
pub use builder::MessageBuilder;
pub use connection::{Connection, NETNS_RUN_DIR};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use socket::NetlinkSocket;
