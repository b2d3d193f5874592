//! Low-level FDC+ wire protocol.
//!
//! Types and helpers for the byte-level interface between the server and
//! the floppy-disk controller: the 10-byte command/response frame, the
//! additive checksum shared by frames and track payloads, typed decoding
//! of inbound commands, and construction of outbound responses.

pub mod checksum;
pub mod frame;
pub mod reply;
pub mod request;

pub use checksum::sum16;
pub use frame::FRAME_SIZE;
pub use frame::Frame;
pub use frame::Status;
pub use reply::Response;
pub use request::Command;
pub use request::RequestError;
pub use request::TrackAddr;
