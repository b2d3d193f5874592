//! Typed decoding of inbound command frames.
//!
//! A checksum-valid frame decodes into a [`Command`]; frames carrying a
//! tag the server does not understand are reported (and then dropped
//! silently on the wire, per the protocol).

use std::error;
use std::fmt;

use super::frame::Frame;
use super::frame::tag;

/// Low twelve bits of `param1` hold the track number for READ and WRIT.
const TRACK_MASK: u16 = 0x0fff;

/// A validated command from the controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// Drive status poll carrying the controller's view of its selection
    /// state.
    Stat {
        /// Currently selected drive; `0xff` when none is selected.
        selected: u8,
        /// Head-loaded flag for the selected drive.
        head_loaded: bool,
        /// Current track number reported by the controller.
        track: u16,
    },
    /// Track read request.
    Read(TrackAddr),
    /// Track write announcement; the payload follows separately.
    Writ(TrackAddr),
}

/// The drive/track/length triple shared by READ and WRIT.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrackAddr {
    /// Drive index, from the top nibble of `param1`.
    pub drive: u8,
    /// Track number, from the low twelve bits of `param1`.
    pub track: u16,
    /// Track length in bytes, from `param2`.
    pub track_len: u16,
}

impl TrackAddr {
    fn unpack(param1: u16, param2: u16) -> TrackAddr {
        TrackAddr {
            drive: (param1 >> 12) as u8,
            track: param1 & TRACK_MASK,
            track_len: param2,
        }
    }
}

/// Error that may occur while decoding a frame into a command.
#[derive(Debug, Eq, PartialEq)]
pub enum RequestError {
    /// The four-byte tag names no command the server understands.
    UnknownTag([u8; 4]),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::UnknownTag(tag) => write!(f, "unknown command tag {tag:02x?}"),
        }
    }
}

impl error::Error for RequestError {}

impl Command {
    /// Decode a checksum-valid frame.
    pub fn decode(frame: &Frame) -> Result<Command, RequestError> {
        let param1 = frame.param1.get();
        let param2 = frame.param2.get();
        match frame.tag {
            tag::STAT => Ok(Command::Stat {
                selected: (param1 & 0x00ff) as u8,
                head_loaded: param1 & 0xff00 != 0,
                track: param2,
            }),
            tag::READ => Ok(Command::Read(TrackAddr::unpack(param1, param2))),
            tag::WRIT => Ok(Command::Writ(TrackAddr::unpack(param1, param2))),
            other => Err(RequestError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Command;
    use super::RequestError;
    use super::TrackAddr;
    use crate::ll::frame::Frame;
    use crate::ll::frame::tag;

    #[test]
    fn decodes_stat() {
        let frame = Frame::new(tag::STAT, 0x0102, 5);
        assert_eq!(
            Command::decode(&frame),
            Ok(Command::Stat {
                selected: 2,
                head_loaded: true,
                track: 5,
            })
        );
    }

    #[test]
    fn decodes_stat_with_no_selection() {
        let frame = Frame::new(tag::STAT, 0x00ff, 0);
        assert_eq!(
            Command::decode(&frame),
            Ok(Command::Stat {
                selected: 0xff,
                head_loaded: false,
                track: 0,
            })
        );
    }

    #[test]
    fn decodes_read_drive_and_track() {
        let frame = Frame::new(tag::READ, (1 << 12) | 5, 137);
        assert_eq!(
            Command::decode(&frame),
            Ok(Command::Read(TrackAddr {
                drive: 1,
                track: 5,
                track_len: 137,
            }))
        );
    }

    #[test]
    fn decodes_writ() {
        let frame = Frame::new(tag::WRIT, (3 << 12) | 0x0fff, 4384);
        assert_eq!(
            Command::decode(&frame),
            Ok(Command::Writ(TrackAddr {
                drive: 3,
                track: 0x0fff,
                track_len: 4384,
            }))
        );
    }

    #[test]
    fn rejects_unknown_tags() {
        let frame = Frame::new(*b"BOOT", 0, 0);
        assert_eq!(
            Command::decode(&frame),
            Err(RequestError::UnknownTag(*b"BOOT"))
        );
    }
}
