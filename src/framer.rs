//! Inbound byte framing and the protocol state machine.
//!
//! The framer accumulates inbound bytes in a single staging buffer and
//! extracts protocol items from it: 10-byte command frames while awaiting
//! a command, or the `track_len + 2` byte payload announced by a WRIT
//! command. Items are extracted one at a time so that a state switch taken
//! while handling a command applies to the remainder of the same byte
//! burst; a fast controller may send the WRIT frame and its payload back
//! to back.
//!
//! There is no sync-pattern search. A desynchronised stream produces
//! checksum failures until the inactivity timeout resets the framer.

use log::debug;

use crate::drive::TRKBUF_SIZE;
use crate::ll::frame::FRAME_SIZE;
use crate::ll::frame::Frame;

/// Staging capacity: one full track payload plus its checksum trailer.
const STAGING_CAPACITY: usize = TRKBUF_SIZE + 2;

#[derive(Debug)]
enum State {
    /// Waiting for a 10-byte command frame.
    AwaitCmd,
    /// Waiting for `track_len` payload bytes plus the 16-bit trailer.
    AwaitPayload { track_len: usize },
}

/// One item extracted from the inbound byte stream.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A checksum-valid command frame.
    Command(Frame),
    /// A 10-byte group whose checksum did not verify. Dropped silently on
    /// the wire; the session counts it.
    BadChecksum,
    /// A complete write payload with its trailer checksum.
    Payload {
        /// The `track_len` payload bytes.
        data: Vec<u8>,
        /// Little-endian trailer checksum as received.
        trailer: u16,
    },
    /// An inbound burst would have overflowed the staging buffer, which
    /// has been cleared.
    Overflow,
}

#[derive(Debug)]
pub(crate) struct Framer {
    buf: Vec<u8>,
    state: State,
}

impl Framer {
    pub(crate) fn new() -> Framer {
        Framer {
            buf: Vec::with_capacity(STAGING_CAPACITY),
            state: State::AwaitCmd,
        }
    }

    /// Append inbound bytes to the staging buffer.
    ///
    /// When the extension would exceed the staging capacity the buffer is
    /// cleared and `Overflow` returned; the state is kept and the next
    /// valid frame re-synchronises.
    pub(crate) fn extend(&mut self, bytes: &[u8]) -> Option<Inbound> {
        if self.buf.len() + bytes.len() > STAGING_CAPACITY {
            self.buf.clear();
            return Some(Inbound::Overflow);
        }
        self.buf.extend_from_slice(bytes);
        None
    }

    /// Extract the next complete item, if the buffer holds one.
    pub(crate) fn take(&mut self) -> Option<Inbound> {
        match self.state {
            State::AwaitCmd => {
                if self.buf.len() < FRAME_SIZE {
                    return None;
                }
                let mut raw = [0u8; FRAME_SIZE];
                raw.copy_from_slice(&self.buf[..FRAME_SIZE]);
                self.buf.drain(..FRAME_SIZE);
                let frame = Frame::parse(raw);
                if frame.verify() {
                    Some(Inbound::Command(frame))
                } else {
                    debug!("dropping frame with bad checksum: {raw:02x?}");
                    Some(Inbound::BadChecksum)
                }
            }
            State::AwaitPayload { track_len } => {
                if self.buf.len() < track_len + 2 {
                    return None;
                }
                let mut data: Vec<u8> = self.buf.drain(..track_len + 2).collect();
                let trailer = u16::from_le_bytes([data[track_len], data[track_len + 1]]);
                data.truncate(track_len);
                self.state = State::AwaitCmd;
                Some(Inbound::Payload { data, trailer })
            }
        }
    }

    /// Arm the payload state after a WRIT command. `track_len` must
    /// already be clamped to the track buffer capacity.
    pub(crate) fn expect_payload(&mut self, track_len: usize) {
        self.state = State::AwaitPayload { track_len };
    }

    /// Drop accumulated bytes and return to awaiting a command.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.state = State::AwaitCmd;
    }
}

#[cfg(test)]
mod test {
    use super::Framer;
    use super::Inbound;
    use crate::ll::frame::Frame;
    use crate::ll::frame::tag;

    #[test]
    fn assembles_a_frame_from_single_bytes() {
        let mut framer = Framer::new();
        let bytes = Frame::new(tag::STAT, 0x00ff, 0).to_bytes();
        for &b in &bytes[..9] {
            assert!(framer.extend(&[b]).is_none());
            assert!(framer.take().is_none());
        }
        framer.extend(&[bytes[9]]);
        match framer.take() {
            Some(Inbound::Command(frame)) => assert_eq!(frame.tag, tag::STAT),
            other => panic!("expected a command, got {other:?}"),
        }
        assert!(framer.take().is_none());
    }

    #[test]
    fn yields_consecutive_frames_from_one_burst() {
        let mut framer = Framer::new();
        let mut burst = Vec::new();
        burst.extend_from_slice(&Frame::new(tag::STAT, 0, 0).to_bytes());
        burst.extend_from_slice(&Frame::new(tag::READ, 0x1005, 137).to_bytes());
        framer.extend(&burst);
        assert!(matches!(framer.take(), Some(Inbound::Command(f)) if f.tag == tag::STAT));
        assert!(matches!(framer.take(), Some(Inbound::Command(f)) if f.tag == tag::READ));
        assert!(framer.take().is_none());
    }

    #[test]
    fn flags_bad_checksums() {
        let mut framer = Framer::new();
        let mut bytes = Frame::new(tag::STAT, 0, 0).to_bytes();
        bytes[2] ^= 0x01;
        framer.extend(&bytes);
        assert!(matches!(framer.take(), Some(Inbound::BadChecksum)));
        assert!(framer.take().is_none());
    }

    #[test]
    fn collects_a_payload_after_arming() {
        let mut framer = Framer::new();
        framer.expect_payload(4);
        framer.extend(&[1, 2, 3, 4, 0x0a, 0x00]);
        match framer.take() {
            Some(Inbound::Payload { data, trailer }) => {
                assert_eq!(data, vec![1, 2, 3, 4]);
                assert_eq!(trailer, 0x000a);
            }
            other => panic!("expected a payload, got {other:?}"),
        }
        // Back to command framing afterwards.
        framer.extend(&Frame::new(tag::STAT, 0, 0).to_bytes());
        assert!(matches!(framer.take(), Some(Inbound::Command(_))));
    }

    #[test]
    fn payload_may_trail_the_command_in_one_burst() {
        let mut framer = Framer::new();
        let mut burst = Vec::new();
        burst.extend_from_slice(&Frame::new(tag::WRIT, 0x000a, 4).to_bytes());
        burst.extend_from_slice(&[9, 9, 9, 9, 0x24, 0x00]);
        framer.extend(&burst);
        assert!(matches!(framer.take(), Some(Inbound::Command(f)) if f.tag == tag::WRIT));
        // The engine arms the payload state while the rest of the burst
        // is still staged.
        framer.expect_payload(4);
        assert!(matches!(
            framer.take(),
            Some(Inbound::Payload { data, trailer: 0x0024 }) if data == vec![9, 9, 9, 9]
        ));
    }

    #[test]
    fn oversized_bursts_clear_the_buffer() {
        let mut framer = Framer::new();
        framer.extend(&[0xaa; 100]);
        let flood = vec![0x55u8; super::STAGING_CAPACITY];
        assert!(matches!(framer.extend(&flood), Some(Inbound::Overflow)));
        assert!(framer.take().is_none());
    }

    #[test]
    fn reset_discards_partial_input() {
        let mut framer = Framer::new();
        framer.extend(&[1, 2, 3]);
        framer.expect_payload(137);
        framer.reset();
        framer.extend(&Frame::new(tag::STAT, 0, 0).to_bytes());
        assert!(matches!(framer.take(), Some(Inbound::Command(_))));
    }
}
