//! Serial drive server for FDC+ floppy disk controllers.
//!
//! The controller initiates every transaction over a high-speed serial
//! link; this crate answers. It serves drive status (STAT), track reads
//! (READ), and track writes (WRIT followed by a WSTA outcome) out of raw
//! sequential-track disk-image files, and supervises link liveness with a
//! single coarse inactivity timeout.
//!
//! A front end (GUI or headless) implements [`Frontend`] to receive
//! status, mount, track, head, and error notifications, and drives the
//! [`Session`] through its mount and port-lifecycle operations. Everything
//! on the wire side is reactive: bytes in, frames out.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

use std::fmt;
use std::path::Path;

pub use crate::channel::BAUD_RATES;
pub use crate::channel::DEFAULT_BAUD;
pub use crate::channel::Link;
pub use crate::channel::SerialChannel;
pub use crate::drive::Geometry;
pub use crate::drive::MAX_DRIVE;
pub use crate::drive::TRKBUF_SIZE;
pub use crate::drive::create_image;
pub use crate::ll::FRAME_SIZE;
pub use crate::ll::Frame;
pub use crate::ll::Status;
pub use crate::ll::sum16;
pub use crate::session::BackgroundSession;
pub use crate::session::INACTIVITY_TIMEOUT;
pub use crate::session::Session;

mod channel;
mod drive;
mod framer;
pub mod ll;
mod session;

/// Link status reported through [`Frontend::status_changed`].
///
/// The `Display` rendering yields the texts front ends show verbatim.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkStatus {
    /// The port is open and waiting for the controller.
    Online,
    /// No port is open.
    Offline,
    /// The controller is actively polling.
    Connected,
    /// The controller stopped talking for the inactivity interval.
    Timeout,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkStatus::Online => "Online",
            LinkStatus::Offline => "Offline",
            LinkStatus::Connected => "Connected",
            LinkStatus::Timeout => "Communications timeout",
        })
    }
}

/// Front-end observer of the drive server.
///
/// The engine delivers every notification synchronously from inside the
/// handler that produced it, on whatever thread is driving the session;
/// implementations must not call back into the session. All methods have
/// no-op defaults so a front end implements only what it displays.
pub trait Frontend {
    /// The link status changed.
    fn status_changed(&mut self, _status: LinkStatus) {}

    /// Transient activity text changed (last transfer, for a message line).
    fn message_changed(&mut self, _text: &str) {}

    /// An operation failed in a way the user should see.
    fn error_message(&mut self, _title: &str, _text: &str) {}

    /// A drive was mounted (`path`/geometry populated) or unmounted.
    fn mount_changed(
        &mut self,
        _drive: usize,
        _mounted: bool,
        _path: Option<&Path>,
        _max_track: u16,
        _size_label: &str,
    ) {
    }

    /// A drive's current track changed.
    fn track_changed(&mut self, _drive: usize, _track: u16) {}

    /// The controller selected a different drive.
    fn drive_changed(&mut self, _drive: usize) {}

    /// A drive's head-loaded flag changed.
    fn head_changed(&mut self, _drive: usize, _loaded: bool) {}
}
