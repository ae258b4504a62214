//! Request/response handling over a routing socket.

use std::net::Ipv4Addr;
use std::path::Path;

use super::builder::MessageBuilder;
use super::message::{MessageIter, NlMsgError, NlMsgType};
use super::route::{get_route_request, parse_route_reply};
use super::socket::NetlinkSocket;
use crate::error::{Error, Result};
use crate::route::{BestRouteQuery, ForwardRow};

/// Directory holding named network namespaces.
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

/// Routing netlink connection.
///
/// # Example
///
/// ```ignore
/// use tunlink::netlink::Connection;
/// use std::net::Ipv4Addr;
///
/// let conn = Connection::new()?;
/// let row = conn.get_route(Ipv4Addr::new(8, 8, 8, 8)).await?;
/// println!("via {:?} dev {}", row.next_hop, row.if_index);
/// ```
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Open a new routing connection.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Open a routing connection inside the network namespace at `ns_path`.
    pub fn new_in_namespace_path<P: AsRef<Path>>(ns_path: P) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new_in_namespace_path(ns_path)?,
        })
    }

    /// Open a routing connection inside a named namespace
    /// (`ip netns add <name>`).
    pub fn new_in_namespace(name: &str) -> Result<Self> {
        Self::new_in_namespace_path(Path::new(NETNS_RUN_DIR).join(name))
    }

    /// Get the underlying socket.
    pub fn socket(&self) -> &NetlinkSocket {
        &self.socket
    }

    /// Send a request and return the payload of the first data reply.
    pub async fn request(&self, mut builder: MessageBuilder) -> Result<Vec<u8>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        loop {
            let data = self.socket.recv_msg().await?;
            if let Some(payload) = Self::process_response(&data, seq)? {
                return Ok(payload);
            }
        }
    }

    /// Scan a datagram for the reply matching `expected_seq`.
    ///
    /// Returns `Ok(None)` if the datagram holds nothing for this request.
    fn process_response(data: &[u8], expected_seq: u32) -> Result<Option<Vec<u8>>> {
        for result in MessageIter::new(data) {
            let (header, payload) = result?;

            if header.nlmsg_seq != expected_seq {
                continue;
            }

            if header.is_error() {
                let errno = NlMsgError::errno_from_bytes(payload)?;
                if errno != 0 {
                    return Err(Error::from_errno(errno));
                }
                return Err(Error::InvalidMessage("ACK without route reply".into()));
            }

            if header.is_done() {
                return Err(Error::InvalidMessage("empty route reply".into()));
            }

            if header.nlmsg_type == NlMsgType::RTM_NEWROUTE {
                return Ok(Some(payload.to_vec()));
            }
        }

        Ok(None)
    }

    /// Ask the kernel which route it would use toward `destination`.
    pub async fn get_route(&self, destination: Ipv4Addr) -> Result<ForwardRow> {
        let payload = self
            .request(get_route_request(destination))
            .await
            .map_err(|e| e.with_context(format!("looking up route to {destination}")))?;
        parse_route_reply(&payload)
    }
}

impl BestRouteQuery for Connection {
    async fn best_route(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Result<ForwardRow> {
        tracing::debug!(%destination, %mask, "querying best route");
        self.get_route(destination).await
    }
}
