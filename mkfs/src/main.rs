//! `mkfs` creates a fresh `imgfs` filesystem in a host directory.
//!
//! Usage: `mkfs [-b <blocks>] <dir>`. `blocks` defaults to 1024 and must
//! be at least [`imgfs::format::MIN_BLOCKS`].

use std::env;
use std::path::PathBuf;
use std::process::exit;

/// Default total block count when `-b` is not given.
const DEFAULT_BLOCKS: u32 = 1024;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// The name of the current program used in command line.
    prog: String,
    /// If true, print command line help.
    help: bool,
    /// Total number of logical blocks to create.
    blocks: Option<u32>,
    /// The filesystem directory to format.
    dir: Option<PathBuf>,
}

fn print_usage(prog: &str) {
    eprintln!("Usage:");
    eprintln!(" {prog} [-b <blocks>] <dir>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h, --help:\tprints usage");
    eprintln!(" -b <blocks>:\ttotal number of logical blocks (default: {DEFAULT_BLOCKS})");
}

fn parse_args() -> Args {
    let mut args: Args = Default::default();
    let mut iter = env::args();
    args.prog = iter.next().unwrap_or_else(|| "mkfs".to_owned());

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => args.help = true,
            "-b" => {
                let value = iter.next().unwrap_or_else(|| {
                    eprintln!("{}: -b requires an argument", args.prog);
                    exit(1);
                });
                args.blocks = Some(value.parse().unwrap_or_else(|_| {
                    eprintln!("{}: invalid block count `{value}`", args.prog);
                    exit(1);
                }));
            }
            _ => args.dir = Some(PathBuf::from(arg)),
        }
    }

    args
}

fn main() {
    env_logger::init();
    let args = parse_args();

    if args.help {
        print_usage(&args.prog);
        exit(0);
    }

    let dir = args.dir.unwrap_or_else(|| {
        print_usage(&args.prog);
        exit(1);
    });
    let blocks = args.blocks.unwrap_or(DEFAULT_BLOCKS);

    imgfs::format::mkfs(&dir, blocks).unwrap_or_else(|e| {
        eprintln!("{}: {}: {}", args.prog, dir.display(), e);
        exit(1);
    });

    println!(
        "{}: created filesystem at {} ({blocks} blocks)",
        args.prog,
        dir.display()
    );
}
