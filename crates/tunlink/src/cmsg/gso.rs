//! UDP segmentation offload hints.
//!
//! On receive, the kernel reports the segment size of a GRO-coalesced
//! datagram in a `UDP_GRO` record. On send, a `UDP_SEGMENT` record asks the
//! kernel to split one large buffer into segments of that size.

use crate::error::{Error, Result};

use super::buffer::ControlBuffer;
use super::header::{CmsgIter, cmsg_space, put};

/// Payload size of a GSO/GRO record.
pub const GSO_DATA_LEN: usize = std::mem::size_of::<u16>();

/// Space one GSO/GRO record occupies in a buffer.
pub const GSO_SPACE: usize = cmsg_space(GSO_DATA_LEN);

/// Read the GRO segment size from a received control buffer.
///
/// Returns 0 if no `UDP_GRO` record is present.
pub fn extract_gso_size(control: &[u8]) -> Result<u16> {
    for cmsg in CmsgIter::new(control) {
        let cmsg = cmsg?;
        if !cmsg.is(libc::SOL_UDP, libc::UDP_GRO) {
            continue;
        }
        let bytes: [u8; GSO_DATA_LEN] = cmsg
            .data
            .get(..GSO_DATA_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(Error::Truncated {
                expected: GSO_DATA_LEN,
                actual: cmsg.data.len(),
            })?;
        return Ok(u16::from_ne_bytes(bytes));
    }
    Ok(0)
}

/// Append a `UDP_SEGMENT` record after the buffer's existing records.
///
/// Returns false without touching the buffer if fewer than [`GSO_SPACE`]
/// bytes remain.
pub fn inject_gso_size(buf: &mut ControlBuffer, size: u16) -> bool {
    let existing = buf.len();
    match put(
        buf.spare_mut(),
        libc::SOL_UDP,
        libc::UDP_SEGMENT,
        &size.to_ne_bytes(),
    ) {
        Some(space) => buf.set_len(existing + space).is_ok(),
        None => false,
    }
}
