/// `sparkalyze` -- retrieve and analyze xSpark cluster log files
///
/// Run with --help for brief help.
///
/// Quirks
///
/// The fetch command trusts the cluster configuration file for node names and credentials; it
/// makes no attempt to discover the cluster.  A stuck transfer is eventually terminated by the
/// transport timeout, but there is no retry -- rerun the command.
///
/// The workers command wants the controller log and the telemetry log of the *same* node;
/// nothing can check that, and mixing nodes silently yields a nonsense correlation.
mod command;
mod fetch;
mod stages;
mod workers;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use sparklog::read_cluster_config;
use std::io;
use std::path::Path;
use std::process;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Parse a driver log and print the per-application stage records
    Stages(StagesCmdArgs),

    /// Parse a worker controller log plus its telemetry and print the series
    Workers(WorkersCmdArgs),

    /// Download the event, report, controller, and telemetry logs from the cluster
    Fetch(FetchCmdArgs),
}

#[derive(Args, Debug)]
pub struct StagesCmdArgs {
    /// Driver log file with log level INFO
    logfile: String,

    /// Print the per-application plot series instead of the stage records
    #[arg(long)]
    series: bool,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct WorkersCmdArgs {
    /// Worker log file holding the controller output
    worker_log: String,

    /// sar telemetry log file of the same node
    cpu_log: String,

    /// File containing JSON data with the cluster configuration
    #[arg(long)]
    config_file: String,

    /// Print the worker-global cpu series instead of the per-stage series
    #[arg(long)]
    cpu: bool,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct FetchCmdArgs {
    /// File containing JSON data with the cluster configuration
    #[arg(long)]
    config_file: String,

    /// Remote folder holding the run's report files [default: from the configuration]
    #[arg(long)]
    log_folder: Option<String>,

    /// Local output folder
    #[arg(long, default_value = "logs")]
    output_folder: String,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print statistics about the input on stderr
    #[arg(long, short)]
    pub verbose: bool,
}

fn main() {
    match sparkalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {msg}");
            process::exit(1);
        }
    }
}

fn sparkalyze() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!("sparkalyze {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Stages(args) => {
            let (log, discarded) = sparklog::parse_driver_log(&args.logfile)?;
            if args.meta_args.verbose {
                eprintln!("{discarded} discarded records");
            }
            if args.series {
                stages::print_series_data(&mut io::stdout(), &log)?;
            } else {
                stages::print_stage_data(&mut io::stdout(), &log)?;
            }
        }
        Commands::Workers(args) => {
            let config = read_cluster_config(&args.config_file)?;
            let (log, discarded) =
                sparklog::load_worker_data(&args.worker_log, &args.cpu_log, &config)?;
            if args.meta_args.verbose {
                eprintln!("{discarded} discarded records");
            }
            if args.cpu {
                workers::print_cpu_series(&mut io::stdout(), &log)?;
            } else {
                workers::print_worker_data(&mut io::stdout(), &log)?;
            }
        }
        Commands::Fetch(args) => {
            let config = read_cluster_config(&args.config_file)?;
            let fetched = fetch::fetch_cluster(
                &config,
                args.log_folder.as_deref(),
                Path::new(&args.output_folder),
                args.meta_args.verbose,
            )?;
            if args.meta_args.verbose {
                for w in &fetched.workers {
                    eprintln!(
                        "{}: worker log {}, cpu log {}, {} executor stderr files",
                        w.node,
                        if w.worker_log.is_some() { "ok" } else { "missing" },
                        if w.cpu_log.is_some() { "ok" } else { "missing" },
                        w.executor_stderr.len()
                    );
                }
            }
            println!("{} {}", fetched.output_dir.display(), fetched.app_id);
        }
    }
    Ok(())
}
