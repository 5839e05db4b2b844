//! RTP fixed header and packet codec (RFC 3550, minimal profile).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::{Error, Result};
use crate::{RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP protocol version; always 2 on the wire.
pub const RTP_VERSION: u8 = 2;

/// Size of the fixed header without CSRC entries.
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// The RTP fixed header.
///
/// Flags and CSRC count are carried through on parse so a captured
/// packet round-trips, but outgoing packets never set them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub cc: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: RtpSequenceNumber,
    pub timestamp: RtpTimestamp,
    pub ssrc: RtpSsrc,
}

impl RtpHeader {
    pub fn new(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
    ) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            cc: 0,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        }
    }

    /// Header size in bytes, including any CSRC words.
    pub fn size(&self) -> usize {
        RTP_MIN_HEADER_SIZE + self.cc as usize * 4
    }

    /// Parse the fixed header, consuming it (and any CSRC words) from
    /// the buffer.
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_MIN_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTP_MIN_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let first = buf.get_u8();
        let version = first >> 6;
        if version != RTP_VERSION {
            return Err(Error::InvalidVersion(version));
        }
        let padding = first & 0x20 != 0;
        let extension = first & 0x10 != 0;
        let cc = first & 0x0F;

        let second = buf.get_u8();
        let marker = second & 0x80 != 0;
        let payload_type = second & 0x7F;

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        // Skip contributing sources; this endpoint never mixes.
        let csrc_len = cc as usize * 4;
        if buf.remaining() < csrc_len {
            return Err(Error::BufferTooSmall {
                required: csrc_len,
                available: buf.remaining(),
            });
        }
        buf.advance(csrc_len);

        Ok(Self {
            version,
            padding,
            extension,
            cc,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        })
    }

    /// Serialize the fixed header. Outgoing headers carry no CSRC
    /// words and no extension.
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(RTP_MIN_HEADER_SIZE);

        let mut first = (self.version & 0x03) << 6;
        if self.padding {
            first |= 0x20;
        }
        if self.extension {
            first |= 0x10;
        }
        buf.put_u8(first);

        let mut second = self.payload_type & 0x7F;
        if self.marker {
            second |= 0x80;
        }
        buf.put_u8(second);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }
}

/// One RTP packet: fixed header plus opaque payload.
#[derive(Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    pub fn size(&self) -> usize {
        self.header.size() + self.payload.len()
    }

    /// Parse a packet from a received datagram.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let header = RtpHeader::parse(&mut buf)?;
        Ok(Self {
            header,
            payload: buf,
        })
    }

    /// Serialize the packet into a contiguous buffer.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RTP_MIN_HEADER_SIZE + self.payload.len());
        self.header.serialize(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpPacket")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
