//! `fsck` walks an `imgfs` filesystem's reachability graph and reports,
//! or with `-y` repairs, inconsistencies between the persisted bitmap
//! and the blocks actually reachable from the root.
//!
//! Usage: `fsck [-f] [-y] [-v] <dir>`. Exit codes: `0` clean, `1`
//! repaired, `4` errors remain, `8` operational failure (superblock or
//! bitmap could not be loaded).

use std::env;
use std::path::PathBuf;
use std::process::exit;

use imgfs::fsck::{self, Finding, Outcome};

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// The name of the current program used in command line.
    prog: String,
    /// If true, print command line help.
    help: bool,
    /// `-f`: force a full check even if the filesystem looks clean.
    /// This engine always performs a full walk, so the flag is accepted
    /// for command-line compatibility and otherwise has no effect.
    force: bool,
    /// `-y`: fix every auto-fixable finding instead of only reporting.
    fix: bool,
    /// `-v`: print every finding, not just the final outcome.
    verbose: bool,
    /// The filesystem directory to check.
    dir: Option<PathBuf>,
}

fn print_usage(prog: &str) {
    eprintln!("Usage:");
    eprintln!(" {prog} [-f] [-y] [-v] <dir>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h, --help:\tprints usage");
    eprintln!(" -f:\t\tforce a full check");
    eprintln!(" -y:\t\tfix every auto-fixable finding");
    eprintln!(" -v:\t\tprint every finding");
}

fn parse_args() -> Args {
    let mut args: Args = Default::default();
    let mut iter = env::args();
    args.prog = iter.next().unwrap_or_else(|| "fsck".to_owned());

    for arg in iter {
        match arg.as_str() {
            "-h" | "--help" => args.help = true,
            "-f" => args.force = true,
            "-y" => args.fix = true,
            "-v" => args.verbose = true,
            _ => args.dir = Some(PathBuf::from(arg)),
        }
    }

    args
}

fn describe(finding: &Finding) -> String {
    match finding {
        Finding::ReservedBitUnset { block } => {
            format!("reserved block {block} was not marked in use in the bitmap")
        }
        Finding::Leak { block } => format!("block {block} is marked in use but is unreachable"),
        Finding::UnderAllocated { block } => {
            format!("block {block} is reachable but not marked in use")
        }
        Finding::SelfNumberMismatch { block, found } => {
            format!("inode at block {block} recorded ino={found}")
        }
        Finding::BlockCountMismatch {
            ino,
            recorded,
            observed,
        } => format!("inode {ino} recorded block_count={recorded}, observed {observed}"),
        Finding::SizeTooLarge { ino, recorded, max } => {
            format!("inode {ino} size {recorded} exceeds its block budget of {max} bytes")
        }
        Finding::DirectorySizeWarning {
            ino,
            recorded,
            expected,
        } => format!("directory {ino} size {recorded} does not match its {expected} occupied bytes"),
        Finding::OrphanedInode { ino } => {
            format!("inode {ino} is allocated and self-consistent but unreachable from root")
        }
        Finding::Loop { at } => format!("reference loop detected at block {at}"),
    }
}

fn main() {
    env_logger::init();
    let args = parse_args();

    if args.help {
        print_usage(&args.prog);
        exit(0);
    }
    let _ = args.force;

    let dir = args.dir.unwrap_or_else(|| {
        print_usage(&args.prog);
        exit(1);
    });

    let report = fsck::check(&dir, args.fix).unwrap_or_else(|e| {
        eprintln!("{}: {}: {}", args.prog, dir.display(), e);
        exit(8);
    });

    if args.verbose || !matches!(report.outcome, Outcome::Clean) {
        for (finding, fixed) in &report.findings {
            let tag = if *fixed { "fixed" } else { "warning" };
            eprintln!("{}: {tag}: {}", args.prog, describe(finding));
        }
    }

    match report.outcome {
        Outcome::Clean => println!("{}: {}: clean", args.prog, dir.display()),
        Outcome::Repaired => println!(
            "{}: {}: repaired {} finding(s)",
            args.prog,
            dir.display(),
            report.findings.len()
        ),
        Outcome::Dirty => println!(
            "{}: {}: {} finding(s) remain",
            args.prog,
            dir.display(),
            report.findings.len()
        ),
        Outcome::OpError => println!("{}: {}: operational failure", args.prog, dir.display()),
    }

    exit(report.exit_code());
}
