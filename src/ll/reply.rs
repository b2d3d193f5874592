//! Outbound response construction.
//!
//! Responses are serialised up front into a single buffer so transmission
//! is one write. Command-frame responses fit inline; track payloads spill
//! to the heap.

use smallvec::SmallVec;

use super::checksum::sum16;
use super::frame::FRAME_SIZE;
use super::frame::Frame;
use super::frame::Status;
use super::frame::tag;

pub(crate) type ResponseBuf = SmallVec<[u8; FRAME_SIZE]>;

/// A fully serialised response, ready for the wire.
#[derive(Debug)]
pub struct Response {
    buf: ResponseBuf,
}

impl Response {
    /// STAT response: `rcode` OK, `rdata` carrying the mount bitmask.
    pub fn stat(mount_mask: u16) -> Response {
        Response::frame(Frame::new(tag::STAT, Status::Ok.into(), mount_mask))
    }

    /// WRIT phase-1 response announcing drive readiness.
    pub fn writ(status: Status) -> Response {
        Response::frame(Frame::new(tag::WRIT, status.into(), 0))
    }

    /// WSTA phase-2 response reporting the write outcome.
    pub fn wsta(status: Status) -> Response {
        Response::frame(Frame::new(tag::WSTA, status.into(), 0))
    }

    /// Bare track payload: `data` followed by a little-endian checksum
    /// trailer summing `data[..sum_len]`. No frame wrapper precedes the
    /// payload on the wire.
    ///
    /// `sum_len` is the byte count actually read from the backing file;
    /// on a short read the zero-padded remainder of `data` is transmitted
    /// but excluded from the sum.
    pub fn track(data: Vec<u8>, sum_len: usize) -> Response {
        let sum = sum16(&data[..sum_len]);
        let mut buf = ResponseBuf::from_vec(data);
        buf.extend_from_slice(&sum.to_le_bytes());
        Response { buf }
    }

    fn frame(frame: Frame) -> Response {
        Response {
            buf: ResponseBuf::from_slice(&frame.to_bytes()),
        }
    }

    /// Wire bytes of this response.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod test {
    use super::Response;
    use crate::ll::checksum::sum16;
    use crate::ll::frame::Frame;
    use crate::ll::frame::Status;

    #[test]
    fn stat_response_carries_mount_mask() {
        let response = Response::stat(0b0101);
        let bytes = response.as_bytes();
        assert_eq!(bytes.len(), 10);
        let mut raw = [0u8; 10];
        raw.copy_from_slice(bytes);
        let frame = Frame::parse(raw);
        assert_eq!(frame.tag, *b"STAT");
        assert_eq!(frame.param1.get(), 0);
        assert_eq!(frame.param2.get(), 0b0101);
        assert!(frame.verify());
    }

    #[test]
    fn wsta_response_carries_status() {
        let response = Response::wsta(Status::ChecksumErr);
        assert_eq!(&response.as_bytes()[0..4], b"WSTA");
        assert_eq!(&response.as_bytes()[4..6], &2u16.to_le_bytes());
    }

    #[test]
    fn track_response_appends_trailer() {
        let data = vec![0x11u8; 137];
        let expected = sum16(&data);
        let response = Response::track(data.clone(), data.len());
        assert_eq!(response.as_bytes().len(), 139);
        assert_eq!(&response.as_bytes()[..137], &data[..]);
        assert_eq!(&response.as_bytes()[137..], &expected.to_le_bytes());
    }

    #[test]
    fn short_read_excludes_padding_from_the_sum() {
        let mut data = vec![0u8; 137];
        data[..4].copy_from_slice(&[1, 2, 3, 4]);
        let response = Response::track(data, 4);
        assert_eq!(&response.as_bytes()[137..], &10u16.to_le_bytes());
    }
}
