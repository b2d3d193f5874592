//! The protocol engine.
//!
//! A session owns the drive table, the framer, and (while a port is open)
//! the serial link. Control flow is entirely reactive: STAT and READ are
//! answered within the turn that delivered them, WRIT is acknowledged
//! immediately and its payload answered with a WSTA frame once it
//! arrives. A single re-armable deadline supervises link liveness.
//!
//! The engine is single-threaded: handlers, file I/O, and notification
//! delivery all run on whatever thread drives it. [`BackgroundSession`]
//! serialises the engine behind a mutex for embedders that want the pump
//! loop on its own thread.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::error;
use log::info;
use log::warn;
use parking_lot::Mutex;

use crate::Frontend;
use crate::LinkStatus;
use crate::channel::Link;
use crate::channel::POLL_INTERVAL;
use crate::channel::SerialChannel;
use crate::drive::DriveTable;
use crate::drive::MAX_DRIVE;
use crate::drive::TRKBUF_SIZE;
use crate::framer::Framer;
use crate::framer::Inbound;
use crate::ll::Command;
use crate::ll::Response;
use crate::ll::Status;
use crate::ll::TrackAddr;
use crate::ll::sum16;

/// Inactivity interval after which the link is considered dead.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Drive-selection sentinel meaning no drive is selected.
const NO_DRIVE: u8 = 0xff;

/// The protocol engine and link supervisor.
#[derive(Debug)]
pub struct Session<F: Frontend> {
    /// The front end receiving this session's notifications.
    pub frontend: F,
    drives: DriveTable,
    framer: Framer,
    link: Option<Box<dyn Link>>,
    connected: bool,
    drive_selected: u8,
    crc_errs: u64,
    pending_write: Option<TrackAddr>,
    deadline: Instant,
}

impl<F: Frontend> Session<F> {
    /// Create a session delivering notifications to `frontend`. The
    /// inactivity deadline is armed immediately.
    pub fn new(frontend: F) -> Session<F> {
        Session {
            frontend,
            drives: DriveTable::default(),
            framer: Framer::new(),
            link: None,
            connected: false,
            drive_selected: NO_DRIVE,
            crc_errs: 0,
            pending_write: None,
            deadline: Instant::now() + INACTIVITY_TIMEOUT,
        }
    }

    /// Open the named serial port at `baud` and begin serving on it. Any
    /// previously open port is closed first.
    pub fn open_port(&mut self, name: &str, baud: u32) -> bool {
        if self.link.is_some() {
            self.close_port();
        }
        match SerialChannel::open(name, baud) {
            Ok(channel) => {
                info!("serving on {name} at {baud} baud");
                self.attach_link(Box::new(channel));
                true
            }
            Err(err) => {
                error!("open {name}: {err}");
                self.frontend
                    .error_message("Serial port", &format!("{name}: {err}"));
                false
            }
        }
    }

    /// Begin serving on an already-open transport.
    ///
    /// [`Session::open_port`] is the serial convenience over this; tests
    /// and alternate transports attach here directly.
    pub fn attach_link(&mut self, link: Box<dyn Link>) {
        self.link = Some(link);
        self.framer.reset();
        self.pending_write = None;
        self.deadline = Instant::now() + INACTIVITY_TIMEOUT;
        self.frontend.status_changed(LinkStatus::Online);
    }

    /// Close the port and drop all link state.
    pub fn close_port(&mut self) {
        self.link = None;
        self.connected = false;
        self.framer.reset();
        self.pending_write = None;
        self.frontend.status_changed(LinkStatus::Offline);
    }

    /// Change the open port's line rate.
    pub fn set_baud(&mut self, baud: u32) -> bool {
        let Some(link) = self.link.as_mut() else {
            self.frontend.error_message("Serial port", "no port open");
            return false;
        };
        match link.set_baud(baud) {
            Ok(()) => {
                info!("line rate changed to {baud} baud");
                true
            }
            Err(err) => {
                error!("set baud {baud}: {err}");
                self.frontend
                    .error_message("Serial port", &format!("baud {baud}: {err}"));
                self.frontend.status_changed(LinkStatus::Offline);
                false
            }
        }
    }

    /// Mount the disk image at `path` on `drive`.
    pub fn mount_disk(&mut self, drive: usize, path: &Path) -> bool {
        self.drives.mount(drive, path, &mut self.frontend)
    }

    /// Unmount whatever is mounted on `drive`.
    pub fn unmount_disk(&mut self, drive: usize) {
        self.drives.unmount(drive, &mut self.frontend);
    }

    /// Count of inbound checksum failures, command frames and payloads
    /// both.
    pub fn crc_errors(&self) -> u64 {
        self.crc_errs
    }

    /// Whether the controller has been heard from within the inactivity
    /// window. Distinct from the port being open.
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Feed inbound bytes through the framer and dispatch every complete
    /// item they yield.
    pub fn handle_bytes(&mut self, bytes: &[u8]) {
        if let Some(item) = self.framer.extend(bytes) {
            self.dispatch(item);
        }
        while let Some(item) = self.framer.take() {
            self.dispatch(item);
        }
    }

    /// One event-loop turn: poll the link, feed the framer, check the
    /// inactivity deadline. Blocks at most the link's poll interval.
    pub fn pump(&mut self) {
        if self.link.is_some() {
            let mut buf = [0u8; 512];
            let received = match self.link.as_mut() {
                Some(link) => link.recv(&mut buf),
                None => Ok(0),
            };
            match received {
                Ok(0) => {}
                Ok(n) => self.handle_bytes(&buf[..n]),
                Err(err) => {
                    error!("receive failed: {err}");
                    self.frontend.error_message("Serial port", &err.to_string());
                    self.close_port();
                }
            }
        }
        if Instant::now() >= self.deadline {
            self.on_timeout();
        }
    }

    /// Serve until the port is closed.
    pub fn run(&mut self) {
        while self.link.is_some() {
            self.pump();
        }
    }

    fn dispatch(&mut self, item: Inbound) {
        match item {
            Inbound::Command(frame) => match Command::decode(&frame) {
                Ok(Command::Stat {
                    selected,
                    head_loaded,
                    track,
                }) => self.handle_stat(selected, head_loaded, track),
                Ok(Command::Read(addr)) => self.handle_read(addr),
                Ok(Command::Writ(addr)) => self.handle_writ(addr),
                Err(err) => debug!("{err}"),
            },
            Inbound::BadChecksum => self.crc_errs += 1,
            Inbound::Payload { data, trailer } => self.handle_payload(&data, trailer),
            Inbound::Overflow => {
                warn!("staging buffer overflow, input discarded");
                self.frontend
                    .error_message("Receive", "staging buffer overflow");
            }
        }
    }

    fn handle_stat(&mut self, selected: u8, head_loaded: bool, track: u16) {
        let previous = self.drive_selected;
        if selected != previous && usize::from(selected) < MAX_DRIVE {
            // 0xff means nothing was selected; never index the table with it.
            if previous != NO_DRIVE && usize::from(previous) < MAX_DRIVE {
                self.drives
                    .set_head(usize::from(previous), false, &mut self.frontend);
            }
            self.frontend.drive_changed(usize::from(selected));
        }
        if usize::from(selected) < MAX_DRIVE {
            self.drives
                .set_head(usize::from(selected), head_loaded, &mut self.frontend);
            self.drives
                .update_track(usize::from(selected), track, &mut self.frontend);
        }
        self.drive_selected = selected;
        self.transmit(&Response::stat(self.drives.mount_mask()));
        if !self.connected {
            self.connected = true;
            self.frontend.status_changed(LinkStatus::Connected);
        }
    }

    fn handle_read(&mut self, addr: TrackAddr) {
        let TrackAddr {
            drive, track, track_len,
        } = addr;
        if usize::from(drive) >= MAX_DRIVE {
            self.frontend
                .error_message("Read", &format!("drive {drive} out of range"));
            return;
        }
        let drive = usize::from(drive);
        // Safety net; the controller always asks for the mounted track length.
        let track_len = usize::from(track_len).min(TRKBUF_SIZE);
        let track = self.drives.update_track(drive, track, &mut self.frontend);
        let mut data = vec![0u8; track_len];
        let filled = match self.drives.read_track(drive, track, &mut data) {
            Ok(filled) => filled,
            Err(err) => {
                warn!("read drive {drive} track {track}: {err}");
                0
            }
        };
        if filled < track_len {
            warn!("short read on drive {drive} track {track}: {filled} of {track_len} bytes");
        }
        self.frontend
            .message_changed(&format!("Drive {drive}: read track {track}"));
        // The full buffer goes out even after a short read; the trailer
        // sums only the bytes the file produced.
        self.transmit(&Response::track(data, filled));
    }

    fn handle_writ(&mut self, addr: TrackAddr) {
        let TrackAddr {
            drive, track, track_len,
        } = addr;
        if usize::from(drive) >= MAX_DRIVE {
            self.frontend
                .error_message("Write", &format!("drive {drive} out of range"));
            return;
        }
        // Clamp before the framer is armed so the payload state can never
        // index past the track buffer.
        let track_len = track_len.min(TRKBUF_SIZE as u16);
        let status = if self.drives.mounted(usize::from(drive)) {
            Status::Ok
        } else {
            Status::NotReady
        };
        // The controller transmits the payload regardless of readiness.
        self.transmit(&Response::writ(status));
        self.pending_write = Some(TrackAddr {
            drive,
            track,
            track_len,
        });
        self.framer.expect_payload(usize::from(track_len));
    }

    fn handle_payload(&mut self, data: &[u8], trailer: u16) {
        let Some(TrackAddr {
            drive, track, track_len,
        }) = self.pending_write.take()
        else {
            error!("write payload with no pending WRIT, dropping {} bytes", data.len());
            return;
        };
        let drive = usize::from(drive);
        let status = if !self.drives.mounted(drive) {
            Status::NotReady
        } else if sum16(data) != trailer {
            self.crc_errs += 1;
            Status::ChecksumErr
        } else {
            let track = self.drives.update_track(drive, track, &mut self.frontend);
            match self.drives.write_track(drive, track, data) {
                Ok(written) if written == usize::from(track_len) => Status::Ok,
                Ok(written) => {
                    warn!(
                        "short write on drive {drive} track {track}: {written} of {track_len} bytes"
                    );
                    Status::WriteErr
                }
                Err(err) => {
                    warn!("write drive {drive} track {track}: {err}");
                    Status::WriteErr
                }
            }
        };
        if status == Status::Ok {
            self.frontend
                .message_changed(&format!("Drive {drive}: wrote track {track}"));
        }
        self.transmit(&Response::wsta(status));
    }

    fn transmit(&mut self, response: &Response) {
        if let Some(link) = self.link.as_mut() {
            if let Err(err) = link.send(response.as_bytes()) {
                error!("transmit failed: {err}");
            }
        }
        // Every outbound frame re-arms the inactivity deadline.
        self.deadline = Instant::now() + INACTIVITY_TIMEOUT;
    }

    fn on_timeout(&mut self) {
        self.deadline = Instant::now() + INACTIVITY_TIMEOUT;
        if self.link.is_some() {
            self.framer.reset();
            self.pending_write = None;
            if self.connected {
                self.connected = false;
                info!("controller went silent, dropping link state");
                self.frontend.status_changed(LinkStatus::Timeout);
            }
        } else {
            self.frontend.status_changed(LinkStatus::Offline);
        }
    }
}

/// A session served from a background thread.
///
/// The engine sits behind a mutex; the pump thread locks it once per poll
/// turn and every front-end operation locks it for the duration of the
/// call, which preserves the engine's single-threaded ordering guarantees.
/// Dropping the handle stops the thread and closes the port.
pub struct BackgroundSession<F: Frontend + Send + 'static> {
    session: Arc<Mutex<Session<F>>>,
    shutdown: Arc<AtomicBool>,
    guard: Option<JoinHandle<()>>,
}

impl<F: Frontend + Send + 'static> BackgroundSession<F> {
    /// Spawn the pump thread for `session`.
    pub fn spawn(session: Session<F>) -> BackgroundSession<F> {
        let session = Arc::new(Mutex::new(session));
        let shutdown = Arc::new(AtomicBool::new(false));
        let pump_session = Arc::clone(&session);
        let pump_shutdown = Arc::clone(&shutdown);
        let guard = thread::spawn(move || {
            while !pump_shutdown.load(Ordering::Relaxed) {
                let port_open = {
                    let mut session = pump_session.lock();
                    session.pump();
                    session.link.is_some()
                };
                if !port_open {
                    // Nothing to poll; don't spin while the port is closed.
                    thread::sleep(POLL_INTERVAL);
                }
            }
        });
        BackgroundSession {
            session,
            shutdown,
            guard: Some(guard),
        }
    }

    /// See [`Session::open_port`].
    pub fn open_port(&self, name: &str, baud: u32) -> bool {
        self.session.lock().open_port(name, baud)
    }

    /// See [`Session::close_port`].
    pub fn close_port(&self) {
        self.session.lock().close_port();
    }

    /// See [`Session::set_baud`].
    pub fn set_baud(&self, baud: u32) -> bool {
        self.session.lock().set_baud(baud)
    }

    /// See [`Session::mount_disk`].
    pub fn mount_disk(&self, drive: usize, path: &Path) -> bool {
        self.session.lock().mount_disk(drive, path)
    }

    /// See [`Session::unmount_disk`].
    pub fn unmount_disk(&self, drive: usize) {
        self.session.lock().unmount_disk(drive);
    }

    /// Run `f` with the locked session.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut Session<F>) -> T) -> T {
        f(&mut self.session.lock())
    }
}

impl<F: Frontend + Send + 'static> Drop for BackgroundSession<F> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(guard) = self.guard.take() {
            if guard.join().is_err() {
                error!("pump thread panicked");
            }
        }
        self.session.lock().close_port();
    }
}

impl<F: Frontend + Send + 'static> fmt::Debug for BackgroundSession<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundSession").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::NO_DRIVE;
    use super::Session;
    use crate::Frontend;
    use crate::LinkStatus;
    use crate::ll::Frame;
    use crate::ll::frame::tag;

    #[derive(Debug, Default)]
    struct Events {
        statuses: Vec<LinkStatus>,
        drives: Vec<usize>,
        heads: Vec<(usize, bool)>,
        errors: Vec<String>,
    }

    impl Frontend for Events {
        fn status_changed(&mut self, status: LinkStatus) {
            self.statuses.push(status);
        }
        fn error_message(&mut self, title: &str, _text: &str) {
            self.errors.push(title.to_owned());
        }
        fn drive_changed(&mut self, drive: usize) {
            self.drives.push(drive);
        }
        fn head_changed(&mut self, drive: usize, loaded: bool) {
            self.heads.push((drive, loaded));
        }
    }

    fn stat(selected: u8, head_loaded: bool, track: u16) -> [u8; 10] {
        let head = u16::from(head_loaded) << 8;
        Frame::new(tag::STAT, head | u16::from(selected), track).to_bytes()
    }

    #[test]
    fn stat_switches_selection_and_clears_the_old_head() {
        let mut session = Session::new(Events::default());
        session.handle_bytes(&stat(0, true, 3));
        assert_eq!(session.drive_selected, 0);
        assert_eq!(session.frontend.drives, vec![0]);
        assert_eq!(session.frontend.heads, vec![(0, true)]);

        session.handle_bytes(&stat(1, true, 7));
        assert_eq!(session.drive_selected, 1);
        assert_eq!(session.frontend.drives, vec![0, 1]);
        // Old drive's head drops before the new drive's loads.
        assert_eq!(session.frontend.heads, vec![(0, true), (0, false), (1, true)]);
    }

    #[test]
    fn stat_with_no_selection_touches_no_slot() {
        let mut session = Session::new(Events::default());
        session.handle_bytes(&stat(NO_DRIVE, true, 0));
        assert_eq!(session.drive_selected, NO_DRIVE);
        assert!(session.frontend.drives.is_empty());
        assert!(session.frontend.heads.is_empty());
        // Deselecting afterwards must not index the table with the sentinel.
        session.handle_bytes(&stat(2, false, 0));
        session.handle_bytes(&stat(NO_DRIVE, false, 0));
        assert_eq!(session.drive_selected, NO_DRIVE);
    }

    #[test]
    fn bad_checksums_are_counted_and_unanswered() {
        let mut session = Session::new(Events::default());
        let mut bytes = stat(0, false, 0);
        bytes[4] ^= 0xff;
        session.handle_bytes(&bytes);
        assert_eq!(session.crc_errors(), 1);
        assert!(session.frontend.statuses.is_empty());
    }

    #[test]
    fn out_of_range_read_reports_and_stays_quiet() {
        let mut session = Session::new(Events::default());
        let frame = Frame::new(tag::READ, (5 << 12) | 1, 137);
        session.handle_bytes(&frame.to_bytes());
        assert_eq!(session.frontend.errors, vec!["Read".to_owned()]);
    }

    #[test]
    fn writ_arms_phase_two_even_when_unmounted() {
        let mut session = Session::new(Events::default());
        let frame = Frame::new(tag::WRIT, 10, 4);
        session.handle_bytes(&frame.to_bytes());
        let pending = session.pending_write.expect("phase 2 must be armed");
        assert_eq!(pending.track_len, 4);
        // The payload still arrives and is consumed.
        session.handle_bytes(&[1, 2, 3, 4, 0x0a, 0x00]);
        assert!(session.pending_write.is_none());
    }
}
