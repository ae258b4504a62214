//! Sticky source addresses.
//!
//! A reply must leave from the local address the request arrived on. The
//! packet-info record received with a datagram is kept with the peer's
//! [`Endpoint`] and echoed back as ancillary data when sending to it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::buffer::ControlBuffer;
use super::header::{Cmsg, CmsgIter, cmsg_space, put};

/// IPv4 packet info (mirrors struct in_pktinfo).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct InPktinfo {
    /// Interface the packet arrived on.
    pub ipi_ifindex: i32,
    /// Local address the packet was routed to.
    pub ipi_spec_dst: [u8; 4],
    /// Header destination address.
    pub ipi_addr: [u8; 4],
}

impl InPktinfo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// IPv6 packet info (mirrors struct in6_pktinfo).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct In6Pktinfo {
    /// Source/destination address.
    pub ipi6_addr: [u8; 16],
    /// Interface index.
    pub ipi6_ifindex: u32,
}

impl In6Pktinfo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Space reserved in an [`Endpoint`] for one packet-info record.
pub const SOURCE_SPACE: usize = cmsg_space(In6Pktinfo::SIZE);

/// A captured local source, stored inline.
#[derive(Clone, Copy)]
struct Source {
    record: [u8; SOURCE_SPACE],
    len: usize,
    ip: Option<IpAddr>,
    ifindex: u32,
}

impl Source {
    const EMPTY: Self = Self {
        record: [0; SOURCE_SPACE],
        len: 0,
        ip: None,
        ifindex: 0,
    };

    /// Decode a packet-info record, if `cmsg` is one with a full payload.
    fn decode(cmsg: &Cmsg<'_>) -> Option<Self> {
        let (ip, ifindex, payload) = if cmsg.is(libc::IPPROTO_IP, libc::IP_PKTINFO) {
            let (info, _) = InPktinfo::read_from_prefix(cmsg.data).ok()?;
            let ip = IpAddr::V4(Ipv4Addr::from(info.ipi_spec_dst));
            (ip, info.ipi_ifindex as u32, &cmsg.data[..InPktinfo::SIZE])
        } else if cmsg.is(libc::IPPROTO_IPV6, libc::IPV6_PKTINFO) {
            let (info, _) = In6Pktinfo::read_from_prefix(cmsg.data).ok()?;
            let ip = IpAddr::V6(Ipv6Addr::from(info.ipi6_addr));
            (ip, info.ipi6_ifindex, &cmsg.data[..In6Pktinfo::SIZE])
        } else {
            return None;
        };

        // Kept byte for byte unless the payload carries trailing bytes the
        // structure does not; then it is re-framed around the structure.
        let mut record = [0u8; SOURCE_SPACE];
        let len = if cmsg.data.len() == payload.len() && cmsg.record.len() <= SOURCE_SPACE {
            record[..cmsg.record.len()].copy_from_slice(cmsg.record);
            cmsg.record.len()
        } else {
            put(&mut record, cmsg.level, cmsg.kind, payload)?
        };
        Some(Self {
            record,
            len,
            ip: Some(ip),
            ifindex,
        })
    }
}

/// A peer address plus the local source last used to talk to it.
#[derive(Clone, Copy)]
pub struct Endpoint {
    dst: SocketAddr,
    src: Source,
}

impl Endpoint {
    /// Create an endpoint with no captured source.
    pub fn new(dst: SocketAddr) -> Self {
        Self {
            dst,
            src: Source::EMPTY,
        }
    }

    /// The peer address.
    pub fn dst(&self) -> SocketAddr {
        self.dst
    }

    /// Local source address, if one was captured.
    pub fn src_ip(&self) -> Option<IpAddr> {
        self.src.ip
    }

    /// Local interface index, 0 if none was captured.
    pub fn src_ifindex(&self) -> u32 {
        self.src.ifindex
    }

    /// The retained packet-info record, empty if none was captured.
    pub fn src_bytes(&self) -> &[u8] {
        &self.src.record[..self.src.len]
    }

    /// Forget the captured source.
    pub fn clear_src(&mut self) {
        self.src = Source::EMPTY;
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("dst", &self.dst)
            .field("src_ip", &self.src.ip)
            .field("src_ifindex", &self.src.ifindex)
            .finish()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.dst == other.dst && self.src_bytes() == other.src_bytes()
    }
}

impl Eq for Endpoint {}

/// Capture the local source from a received control buffer.
///
/// The endpoint's source is cleared first, then set from the first IPv4 or
/// IPv6 packet-info record with a complete payload. Malformed framing ends
/// the scan and leaves the source cleared.
pub fn extract_source(control: &[u8], ep: &mut Endpoint) {
    ep.clear_src();
    for cmsg in CmsgIter::new(control) {
        let Ok(cmsg) = cmsg else {
            return;
        };
        if let Some(src) = Source::decode(&cmsg) {
            ep.src = src;
            return;
        }
    }
}

/// Replace the contents of `buf` with the endpoint's retained record.
///
/// An endpoint without a source empties the buffer. Returns false without
/// touching the buffer if the record does not fit.
pub fn inject_source(buf: &mut ControlBuffer, ep: &Endpoint) -> bool {
    buf.replace_with(ep.src_bytes())
}
