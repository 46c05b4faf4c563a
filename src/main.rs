use clap::Parser;
use clap::error::ErrorKind;
use colored::*;
use std::path::PathBuf;
use sudo::RunningAs;

use fsextend::executor::{self, ExecOutcome};
use fsextend::planner::{self, FILTER_LVM_ALREADY_PLACED, Filter};
use fsextend::runner::SystemRunner;
use fsextend::{graph, lock};

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 11;
const EXIT_REBOOT: i32 = 128;
const EXIT_EXEC_FAILED: i32 = 1;

/// Grow the filesystem under a mount point into all free disk space below
/// it, through partitions and LVM.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Absolute path of the mount point to extend
    mount_point: PathBuf,

    /// Execute the plan instead of printing it
    #[arg(long = "do")]
    execute: bool,

    /// Admissible free-space sources, comma separated:
    /// lvm-already-placed, same-disk, all-disks, none
    #[arg(short = 'f', long = "filter", default_value = FILTER_LVM_ALREADY_PLACED)]
    filter: String,

    /// Trace external commands to stderr
    #[arg(long)]
    debug: bool,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            let _ = err.print();
            return EXIT_OK;
        }
        Err(err) => {
            let _ = err.print();
            return EXIT_USAGE;
        }
    };

    if !cli.mount_point.is_absolute() {
        eprintln!("{}", "mount point must be an absolute path".red());
        return EXIT_USAGE;
    }

    let filter = match Filter::parse(&cli.filter) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            return EXIT_USAGE;
        }
    };

    let runner = SystemRunner::new(cli.debug);

    let storage = match graph::build(&runner, &cli.mount_point) {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("{}: {}", "Can't resolve storage stack".red(), err);
            return EXIT_USAGE;
        }
    };

    // Hold every disk in the graph until we exit; a concurrent run against
    // the same disks would corrupt the tables.
    let disk_paths: Vec<PathBuf> = storage.disks.iter().map(|d| d.path.clone()).collect();
    let _locks = match lock::lock_disk_paths(&disk_paths) {
        Ok(locks) => locks,
        Err(err) => {
            eprintln!("{}: {}", "Can't lock disks".red(), err);
            return EXIT_USAGE;
        }
    };

    let plan = match planner::plan(&storage, &filter) {
        Ok(plan) => plan,
        Err(failure) => {
            if !cli.execute {
                for line in failure.partial.render() {
                    println!("{line}");
                }
            }
            eprintln!("{}: {}", "Error while planning extend".red(), failure);
            return EXIT_USAGE;
        }
    };

    if !cli.execute {
        if plan.is_empty() {
            println!("{}", "Nothing to do.".green());
        } else {
            for line in plan.render() {
                println!("{line}");
            }
        }
        return EXIT_OK;
    }

    if matches!(sudo::check(), RunningAs::User) {
        eprintln!("{}", "Executing the plan requires root.".red());
        return EXIT_USAGE;
    }

    if let Err(err) = executor::preflight(&plan) {
        eprintln!("{}", err.to_string().red());
        return EXIT_USAGE;
    }

    match executor::execute(&runner, &plan) {
        Ok(ExecOutcome::Completed) => {
            println!("{}", "OK".green().bold());
            EXIT_OK
        }
        Ok(ExecOutcome::RebootRequired) => {
            println!(
                "{}",
                "NEED REBOOT AND START ME ONCE AGAIN.".yellow().bold()
            );
            EXIT_REBOOT
        }
        Err(err) => {
            eprintln!("{}: {}", "Execution failed".red(), err);
            EXIT_EXEC_FAILED
        }
    }
}
