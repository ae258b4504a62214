//! Control-message (cmsghdr) framing.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Control-message alignment (`sizeof(size_t)` on Linux).
pub const CMSG_ALIGNTO: usize = std::mem::size_of::<usize>();

/// Align a length to CMSG_ALIGNTO boundary.
#[inline]
pub const fn cmsg_align(len: usize) -> usize {
    (len + CMSG_ALIGNTO - 1) & !(CMSG_ALIGNTO - 1)
}

/// Size of the control-message header including alignment.
pub const CMSG_HDRLEN: usize = cmsg_align(std::mem::size_of::<CmsgHdr>());

/// Value of `cmsg_len` for a record carrying `data_len` payload bytes.
#[inline]
pub const fn cmsg_len(data_len: usize) -> usize {
    CMSG_HDRLEN + data_len
}

/// Bytes a record carrying `data_len` payload bytes occupies in a buffer.
#[inline]
pub const fn cmsg_space(data_len: usize) -> usize {
    CMSG_HDRLEN + cmsg_align(data_len)
}

/// Control-message header (mirrors struct cmsghdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct CmsgHdr {
    /// Length including header, excluding trailing padding.
    pub cmsg_len: usize,
    /// Originating protocol.
    pub cmsg_level: i32,
    /// Protocol-specific type.
    pub cmsg_type: i32,
}

impl CmsgHdr {
    /// Create a header for a record with `data_len` payload bytes.
    pub fn new(level: i32, kind: i32, data_len: usize) -> Self {
        Self {
            cmsg_len: cmsg_len(data_len),
            cmsg_level: level,
            cmsg_type: kind,
        }
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }
}

/// One decoded control message.
#[derive(Debug, Clone, Copy)]
pub struct Cmsg<'a> {
    /// Originating protocol.
    pub level: i32,
    /// Protocol-specific type.
    pub kind: i32,
    /// Payload as declared by `cmsg_len`.
    pub data: &'a [u8],
    /// The whole record: header, payload and whatever padding is present.
    pub record: &'a [u8],
}

impl Cmsg<'_> {
    /// Check the record's level and type.
    pub fn is(&self, level: i32, kind: i32) -> bool {
        self.level == level && self.kind == kind
    }
}

/// Iterator over the records in a control buffer.
///
/// Yields an error and stops if a header declares a length that is shorter
/// than the header itself or runs past the end of the buffer.
pub struct CmsgIter<'a> {
    data: &'a [u8],
}

impl<'a> CmsgIter<'a> {
    /// Create a new record iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for CmsgIter<'a> {
    type Item = Result<Cmsg<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (header, _) = CmsgHdr::read_from_prefix(self.data).ok()?;

        let len = header.cmsg_len;
        if len < CMSG_HDRLEN || len > self.data.len() {
            let remaining = self.data.len();
            self.data = &[];
            return Some(Err(Error::InvalidMessage(format!(
                "control message length {} with {} bytes remaining",
                len, remaining
            ))));
        }

        let data = &self.data[CMSG_HDRLEN..len];
        let aligned_len = cmsg_align(len).min(self.data.len());
        let record = &self.data[..aligned_len];
        self.data = &self.data[aligned_len..];

        Some(Ok(Cmsg {
            level: header.cmsg_level,
            kind: header.cmsg_type,
            data,
            record,
        }))
    }
}

/// Write one record at the start of `dst`, zeroing the padding.
///
/// Returns the space used, or `None` without writing if `dst` is too small.
pub(crate) fn put(dst: &mut [u8], level: i32, kind: i32, payload: &[u8]) -> Option<usize> {
    let space = cmsg_space(payload.len());
    let slot = dst.get_mut(..space)?;

    let header = CmsgHdr::new(level, kind, payload.len());
    slot[..std::mem::size_of::<CmsgHdr>()].copy_from_slice(header.as_bytes());
    slot[std::mem::size_of::<CmsgHdr>()..CMSG_HDRLEN].fill(0);
    slot[CMSG_HDRLEN..cmsg_len(payload.len())].copy_from_slice(payload);
    slot[cmsg_len(payload.len())..].fill(0);
    Some(space)
}
