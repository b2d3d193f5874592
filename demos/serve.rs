use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use fdc_server::BAUD_RATES;
use fdc_server::DEFAULT_BAUD;
use fdc_server::Frontend;
use fdc_server::LinkStatus;
use fdc_server::MAX_DRIVE;
use fdc_server::Session;
use log::error;
use log::info;

#[derive(Parser)]
#[command(version, about = "Headless FDC+ serial drive server")]
struct Args {
    /// Serial port to serve on, e.g. /dev/ttyUSB0
    port: String,

    /// Line rate
    #[clap(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Disk image to mount; repeat to fill drive slots in order
    #[clap(long = "disk")]
    disks: Vec<PathBuf>,
}

struct Console;

impl Frontend for Console {
    fn status_changed(&mut self, status: LinkStatus) {
        info!("status: {status}");
    }

    fn message_changed(&mut self, text: &str) {
        info!("{text}");
    }

    fn error_message(&mut self, title: &str, text: &str) {
        error!("{title}: {text}");
    }

    fn mount_changed(
        &mut self,
        drive: usize,
        mounted: bool,
        path: Option<&Path>,
        max_track: u16,
        size_label: &str,
    ) {
        if mounted {
            let path = path.map(Path::display);
            info!(
                "drive {drive}: {} ({size_label}, {max_track} tracks)",
                path.expect("mounted drives have a path")
            );
        } else {
            info!("drive {drive}: no disk");
        }
    }

    fn drive_changed(&mut self, drive: usize) {
        info!("drive {drive} selected");
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if args.disks.len() > MAX_DRIVE {
        eprintln!("at most {MAX_DRIVE} disks can be mounted");
        process::exit(2);
    }
    if !BAUD_RATES.contains(&args.baud) {
        eprintln!("warning: {} baud is not a standard FDC+ rate", args.baud);
    }

    let mut session = Session::new(Console);
    for (drive, path) in args.disks.iter().enumerate() {
        if !session.mount_disk(drive, path) {
            process::exit(1);
        }
    }
    if !session.open_port(&args.port, args.baud) {
        process::exit(1);
    }
    session.run();
}
