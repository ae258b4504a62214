//! Socket control-message (ancillary data) codec for UDP sockets.
//!
//! This covers the two records a tunnel transport exchanges with the kernel
//! on every datagram:
//!
//! - packet info (`IP_PKTINFO` / `IPV6_PKTINFO`), captured on receive into an
//!   [`Endpoint`] and echoed back on send so replies keep their source
//!   address;
//! - UDP segmentation offload (`UDP_GRO` on receive, `UDP_SEGMENT` on send).
//!
//! Nothing here allocates on the packet path: buffers come from a
//! [`ControlPool`] and endpoints store their record inline.
//!
//! # Example
//!
//! ```ignore
//! use tunlink::cmsg::{ControlBuffer, Endpoint, extract_gso_size, extract_source};
//!
//! let mut control = ControlBuffer::recommended();
//! // recvmsg(fd, ..., control.capacity_mut()) reported `controllen` bytes
//! control.set_len(controllen)?;
//!
//! extract_source(control.bytes(), &mut endpoint);
//! let segment = extract_gso_size(control.bytes())?;
//! ```

mod buffer;
mod endpoint;
mod gso;
mod header;

pub use buffer::{ControlBuffer, ControlPool};
pub use endpoint::{Endpoint, In6Pktinfo, InPktinfo, SOURCE_SPACE, extract_source, inject_source};
pub use gso::{GSO_DATA_LEN, GSO_SPACE, extract_gso_size, inject_gso_size};
pub use header::{
    CMSG_ALIGNTO, CMSG_HDRLEN, Cmsg, CmsgHdr, CmsgIter, cmsg_align, cmsg_len, cmsg_space,
};

/// Recommended control buffer size: one IPv6 packet-info record plus one
/// offload record.
pub const CONTROL_SIZE: usize = SOURCE_SPACE + GSO_SPACE;
