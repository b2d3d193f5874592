//! The 10-byte command/response frame.
//!
//! The same layout serves both directions. The controller fills
//! `param1`/`param2`; server responses carry `rcode`/`rdata` in their
//! place. All fields are little-endian and the `checksum` field is the
//! 16-bit additive sum of the first eight bytes.

use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::little_endian::U16;

use super::checksum::sum16;

/// Size of a command or response frame on the wire.
pub const FRAME_SIZE: usize = 10;

/// Leading frame bytes covered by the checksum field.
const CHECKSUM_SPAN: usize = 8;

/// The four-character ASCII command tags.
pub mod tag {
    /// Drive status poll.
    pub const STAT: [u8; 4] = *b"STAT";
    /// Track read.
    pub const READ: [u8; 4] = *b"READ";
    /// Track write announcement.
    pub const WRIT: [u8; 4] = *b"WRIT";
    /// Write outcome (server to controller only).
    pub const WSTA: [u8; 4] = *b"WSTA";
}

/// Response codes carried in the `rcode` word of a response frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Status {
    /// Operation completed.
    Ok = 0x0000,
    /// The addressed drive has no image mounted.
    NotReady = 0x0001,
    /// Track payload checksum mismatch.
    ChecksumErr = 0x0002,
    /// The backing file write failed or came up short.
    WriteErr = 0x0003,
}

/// A command or response frame.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct Frame {
    /// Four ASCII command characters.
    pub tag: [u8; 4],
    /// First parameter word; `rcode` in responses.
    pub param1: U16,
    /// Second parameter word; `rdata` in responses.
    pub param2: U16,
    /// Additive checksum of bytes 0..8.
    pub checksum: U16,
}

const _: () = assert!(size_of::<Frame>() == FRAME_SIZE);

impl Frame {
    /// Build a frame with the checksum field sealed.
    pub fn new(tag: [u8; 4], param1: u16, param2: u16) -> Frame {
        let mut frame = Frame {
            tag,
            param1: U16::new(param1),
            param2: U16::new(param2),
            checksum: U16::new(0),
        };
        frame.checksum = U16::new(sum16(&frame.to_bytes()[..CHECKSUM_SPAN]));
        frame
    }

    /// Reinterpret exactly [`FRAME_SIZE`] bytes as a frame.
    ///
    /// The checksum is not validated; see [`Frame::verify`].
    pub fn parse(bytes: [u8; FRAME_SIZE]) -> Frame {
        zerocopy::transmute!(bytes)
    }

    /// The frame's wire bytes.
    pub fn to_bytes(self) -> [u8; FRAME_SIZE] {
        zerocopy::transmute!(self)
    }

    /// Whether the checksum field matches the first eight bytes.
    pub fn verify(&self) -> bool {
        sum16(&self.to_bytes()[..CHECKSUM_SPAN]) == self.checksum.get()
    }
}
