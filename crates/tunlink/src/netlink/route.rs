//! RTM_GETROUTE request encoding and reply decoding.

use std::net::Ipv4Addr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::attr::{AttrIter, get};
use super::builder::MessageBuilder;
use super::message::{NLM_F_REQUEST, NlMsgType};
use crate::error::{Error, Result};
use crate::route::ForwardRow;

const AF_INET: u8 = 2;

/// Route attribute types (RTA_*).
mod rta {
    pub const DST: u16 = 1;
    pub const OIF: u16 = 4;
    pub const GATEWAY: u16 = 5;
    pub const TABLE: u16 = 15;
}

/// Routing message header (mirrors struct rtmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RtMsg {
    /// Address family.
    pub rtm_family: u8,
    /// Destination prefix length.
    pub rtm_dst_len: u8,
    /// Source prefix length.
    pub rtm_src_len: u8,
    /// TOS filter.
    pub rtm_tos: u8,
    /// Routing table ID.
    pub rtm_table: u8,
    /// Routing protocol (RTPROT_*).
    pub rtm_protocol: u8,
    /// Route scope (RT_SCOPE_*).
    pub rtm_scope: u8,
    /// Route type (RTN_*).
    pub rtm_type: u8,
    /// Route flags.
    pub rtm_flags: u32,
}

impl RtMsg {
    /// Size of this structure.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Build a best-route lookup for a single IPv4 destination.
///
/// The kernel resolves host lookups, so the request always carries a /32
/// destination.
pub fn get_route_request(destination: Ipv4Addr) -> MessageBuilder {
    let rtm = RtMsg {
        rtm_family: AF_INET,
        rtm_dst_len: 32,
        ..Default::default()
    };

    let mut builder = MessageBuilder::new(NlMsgType::RTM_GETROUTE, NLM_F_REQUEST);
    builder.append(&rtm);
    builder.append_attr(rta::DST, &destination.octets());
    builder
}

/// Decode an RTM_NEWROUTE reply payload into a forwarding row.
pub fn parse_route_reply(payload: &[u8]) -> Result<ForwardRow> {
    let (rtm, _) = RtMsg::read_from_prefix(payload).map_err(|_| Error::Truncated {
        expected: RtMsg::SIZE,
        actual: payload.len(),
    })?;

    if rtm.rtm_family != AF_INET {
        return Err(Error::InvalidMessage(format!(
            "unexpected route family {}",
            rtm.rtm_family
        )));
    }

    let mut row = ForwardRow {
        destination: Ipv4Addr::UNSPECIFIED,
        prefix_len: rtm.rtm_dst_len,
        next_hop: None,
        if_index: 0,
        table: u32::from(rtm.rtm_table),
    };

    for (kind, data) in AttrIter::new(&payload[RtMsg::SIZE..]) {
        match kind {
            rta::DST => row.destination = get::ipv4(data)?,
            rta::GATEWAY => row.next_hop = Some(get::ipv4(data)?),
            rta::OIF => row.if_index = get::u32_ne(data)?,
            rta::TABLE => row.table = get::u32_ne(data)?,
            _ => {}
        }
    }

    Ok(row)
}
