//! The drive table: mount state, geometry, and track file I/O.
//!
//! Each of the [`MAX_DRIVE`] slots can hold an open disk-image file.
//! Images are raw sequential tracks with no header; geometry is inferred
//! from the file's byte length at mount time, and a track lives at byte
//! offset `track * track_len`.

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use log::info;

use crate::Frontend;

/// Number of drive slots the server exposes.
pub const MAX_DRIVE: usize = 4;

/// Track buffer capacity in bytes: 137-byte sectors, 32 to a track.
pub const TRKBUF_SIZE: usize = 137 * 32;

/// Disk-image geometry inferred from the file's byte length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Geometry {
    /// Highest track number the image holds.
    pub max_track: u16,
    /// Cosmetic size label for front ends.
    pub size_label: &'static str,
}

impl Geometry {
    /// Infer geometry from an image's byte length. Unrecognised lengths
    /// fall back to the large-disk track count with an unknown label.
    pub fn infer(len: u64) -> Geometry {
        match len {
            76_800 => Geometry {
                max_track: 34,
                size_label: "75K",
            },
            337_664 => Geometry {
                max_track: 76,
                size_label: "330K",
            },
            8_978_432 => Geometry {
                max_track: 2047,
                size_label: "8MB",
            },
            _ => Geometry {
                max_track: 2047,
                size_label: "???",
            },
        }
    }
}

/// Create a zero-filled disk image of `len` bytes at `path`.
///
/// Fails if `path` already exists.
/// # Errors
/// Returns the underlying I/O error when the file cannot be created.
pub fn create_image(path: &Path, len: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.set_len(len)?;
    Ok(())
}

#[derive(Debug, Default)]
struct Slot {
    file: Option<File>,
    path: Option<PathBuf>,
    geometry: Option<Geometry>,
    cur_track: u16,
    head_loaded: bool,
}

/// The fixed table of drive slots backing the protocol engine.
#[derive(Debug, Default)]
pub(crate) struct DriveTable {
    slots: [Slot; MAX_DRIVE],
}

impl DriveTable {
    /// Mount the image at `path` on `drive`, replacing whatever the slot
    /// held. On failure the slot is left unmounted and its previous
    /// geometry untouched.
    pub(crate) fn mount<F: Frontend>(
        &mut self,
        drive: usize,
        path: &Path,
        frontend: &mut F,
    ) -> bool {
        if drive >= MAX_DRIVE {
            frontend.error_message("Mount", &format!("drive {drive} out of range"));
            return false;
        }
        let slot = &mut self.slots[drive];
        slot.file = None;
        slot.cur_track = 0;
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) => {
                frontend.error_message("Mount", &format!("{}: {err}", path.display()));
                return false;
            }
        };
        let len = match file.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                frontend.error_message("Mount", &format!("{}: {err}", path.display()));
                return false;
            }
        };
        let geometry = Geometry::infer(len);
        info!(
            "drive {drive}: mounted {} ({len} bytes, {})",
            path.display(),
            geometry.size_label
        );
        slot.file = Some(file);
        slot.path = Some(path.to_path_buf());
        slot.geometry = Some(geometry);
        frontend.mount_changed(drive, true, Some(path), geometry.max_track, geometry.size_label);
        frontend.track_changed(drive, 0);
        true
    }

    /// Unmount whatever is mounted on `drive`.
    pub(crate) fn unmount<F: Frontend>(&mut self, drive: usize, frontend: &mut F) {
        if drive >= MAX_DRIVE {
            frontend.error_message("Unmount", &format!("drive {drive} out of range"));
            return;
        }
        let slot = &mut self.slots[drive];
        if slot.file.is_some() {
            if slot.cur_track != 0 {
                slot.cur_track = 0;
                frontend.track_changed(drive, 0);
            }
            slot.file = None;
            info!("drive {drive}: unmounted");
        }
        slot.path = None;
        slot.geometry = None;
        frontend.mount_changed(drive, false, None, 0, "");
    }

    pub(crate) fn mounted(&self, drive: usize) -> bool {
        self.slots[drive].file.is_some()
    }

    /// Bitmask with bit `d` set iff drive `d` is mounted.
    pub(crate) fn mount_mask(&self) -> u16 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.file.is_some())
            .fold(0, |mask, (drive, _)| mask | (1 << drive))
    }

    /// Update a drive's head-loaded flag, notifying on change. Out-of-range
    /// indices are ignored; the sentinel never reaches the callback.
    pub(crate) fn set_head<F: Frontend>(&mut self, drive: usize, loaded: bool, frontend: &mut F) {
        if drive >= MAX_DRIVE {
            return;
        }
        let slot = &mut self.slots[drive];
        if slot.head_loaded != loaded {
            slot.head_loaded = loaded;
            frontend.head_changed(drive, loaded);
        }
    }

    pub(crate) fn head_loaded(&self, drive: usize) -> bool {
        self.slots[drive].head_loaded
    }

    /// Record the drive's current track, notifying on change, and return
    /// the effective track. Unmounted drives are pinned to track 0 so no
    /// seek is ever attempted against a missing file.
    pub(crate) fn update_track<F: Frontend>(
        &mut self,
        drive: usize,
        track: u16,
        frontend: &mut F,
    ) -> u16 {
        if drive >= MAX_DRIVE {
            frontend.error_message("Drive", &format!("drive {drive} out of range"));
            return track;
        }
        let slot = &mut self.slots[drive];
        let effective = if slot.file.is_some() { track } else { 0 };
        if effective != slot.cur_track {
            slot.cur_track = effective;
            frontend.track_changed(drive, effective);
        }
        effective
    }

    /// Read the track at `track * buf.len()` into `buf`, returning the
    /// byte count actually read. Unmounted drives and reads past EOF come
    /// up short; the caller decides what that means.
    pub(crate) fn read_track(
        &mut self,
        drive: usize,
        track: u16,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let Some(file) = self.slots[drive].file.as_mut() else {
            return Ok(0);
        };
        file.seek(SeekFrom::Start(u64::from(track) * buf.len() as u64))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Write a track payload at `track * data.len()`, returning the byte
    /// count the file accepted.
    pub(crate) fn write_track(
        &mut self,
        drive: usize,
        track: u16,
        data: &[u8],
    ) -> io::Result<usize> {
        let Some(file) = self.slots[drive].file.as_mut() else {
            return Ok(0);
        };
        file.seek(SeekFrom::Start(u64::from(track) * data.len() as u64))?;
        let written = file.write(data)?;
        Ok(written)
    }
}
