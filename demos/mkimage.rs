use std::path::PathBuf;
use std::process;

use clap::Parser;
use clap::ValueEnum;
use fdc_server::create_image;

#[derive(Clone, Copy, ValueEnum)]
enum Size {
    /// 5.25" minidisk, 35 tracks
    #[value(name = "75k")]
    Minidisk,
    /// 8" floppy, 77 tracks
    #[value(name = "330k")]
    Floppy,
    /// Hard-disk image, 2048 tracks
    #[value(name = "8mb")]
    HardDisk,
}

impl Size {
    fn bytes(self) -> u64 {
        match self {
            Size::Minidisk => 76_800,
            Size::Floppy => 337_664,
            Size::HardDisk => 8_978_432,
        }
    }
}

#[derive(Parser)]
#[command(version, about = "Create a blank FDC+ disk image")]
struct Args {
    /// Image geometry
    #[clap(long, value_enum, default_value = "330k")]
    size: Size,

    /// Path of the image to create
    path: PathBuf,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = create_image(&args.path, args.size.bytes()) {
        eprintln!("{}: {err}", args.path.display());
        process::exit(1);
    }
}
