// SPDX-License-Identifier: MIT
//! check_scoutam — CLI entry point.
//!
//! Parses arguments, verifies the cluster tools are installed, runs the
//! requested operation, prints one labeled line per finding on stdout, and
//! exits with the NRPE code of the combined verdict (0 OK, 1 WARNING,
//! 2 CRITICAL, 3 UNKNOWN). Diagnostics go to stderr via `tracing` so they
//! never mix with the check result.

use clap::error::ErrorKind;
use clap::Parser;

use scoutam_check::config::{CheckConfig, DEFAULT_SEQ_CRIT_SECS, DEFAULT_SEQ_WARN_SECS};
use scoutam_check::dispatch::{self, Operation};
use scoutam_check::facts::LiveFacts;
use scoutam_check::state::StateStore;
use scoutam_check::verdict::Verdict;

#[derive(Parser)]
#[command(
    name = "check_scoutam",
    about = "Node-local NRPE checks for ScoutAM/ScoutFS clusters",
    version
)]
struct Args {
    /// Remap the WARNING exit code to 0 (CRITICAL and UNKNOWN never remap)
    #[arg(long, short = 'p')]
    passfail: bool,

    /// Restrict mount-based checks to this mount point
    #[arg(long, short = 'm', value_name = "PATH")]
    mount: Option<String>,

    /// Verbose diagnostics on stderr
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Debug diagnostics on stderr (includes tool invocations)
    #[arg(long, short = 'd')]
    debug: bool,

    /// Check operation to run
    #[arg(value_enum)]
    operation: Operation,

    /// Capacity warning threshold in percent (default: cluster low watermark)
    warn_thresh: Option<u64>,

    /// Capacity critical threshold in percent (default: cluster high watermark)
    crit_thresh: Option<u64>,

    /// Arfind blocked-duration warning threshold in seconds
    #[arg(long, value_name = "S", default_value_t = DEFAULT_SEQ_WARN_SECS)]
    arfind_warn: u64,

    /// Arfind blocked-duration critical threshold in seconds
    #[arg(long, value_name = "S", default_value_t = DEFAULT_SEQ_CRIT_SECS)]
    arfind_crit: u64,

    /// Stfind blocked-duration warning threshold in seconds
    #[arg(long, value_name = "S", default_value_t = DEFAULT_SEQ_WARN_SECS)]
    stfind_warn: u64,

    /// Stfind blocked-duration critical threshold in seconds
    #[arg(long, value_name = "S", default_value_t = DEFAULT_SEQ_CRIT_SECS)]
    stfind_crit: u64,
}

fn init_tracing(verbose: bool, debug: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if debug {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    // An unknown operation or malformed argument is a configuration error:
    // print usage and exit UNKNOWN rather than clap's default code.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            let _ = e.print();
            std::process::exit(Verdict::Ok.exit_code());
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(Verdict::Unknown.exit_code());
        }
    };

    init_tracing(args.verbose, args.debug);

    if let Err(e) = LiveFacts::required_tools_present() {
        println!("UNKNOWN: {e}");
        std::process::exit(Verdict::Unknown.exit_code());
    }

    let config = match CheckConfig::from_cli(
        args.mount,
        args.passfail,
        args.warn_thresh,
        args.crit_thresh,
        args.arfind_warn,
        args.arfind_crit,
        args.stfind_warn,
        args.stfind_crit,
    ) {
        Ok(config) => config,
        Err(e) => {
            println!("UNKNOWN: {e}");
            std::process::exit(Verdict::Unknown.exit_code());
        }
    };

    let facts = LiveFacts::new();
    let store = StateStore::from_env();
    let report = dispatch::run(args.operation, &config, &facts, store).await;

    for line in &report.lines {
        println!("{line}");
    }
    std::process::exit(report.exit_code);
}
