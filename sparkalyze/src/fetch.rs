/// Retrieval of the cluster's log files.
///
/// The master (coordinator) node holds the spark event log directory plus the run's report files;
/// each worker node holds its controller log, its sar telemetry log, and the executors' stderr
/// files.  The transport is the local ssh/scp binaries driven through `command`; the parsers only
/// ever see readable local files.
///
/// Worker downloads run concurrently across a pool bounded by the local core count.  Every
/// download task returns its own result and the orchestrator merges them; nothing is shared
/// between concurrent tasks.  A missing remote file is reported and skipped, never fatal;
/// transport failures against the master surface as errors since there is nothing to analyze
/// without its logs.
use crate::command;

use anyhow::{anyhow, bail, Result};
use sparklog::ClusterConfig;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

const TRANSFER_TIMEOUT_SECS: u64 = 600;

/// Where one worker node's files ended up locally.  A field is None (or an entry absent) when the
/// remote file was missing.

#[derive(Debug)]
pub struct WorkerFetch {
    pub node: String,
    pub worker_log: Option<PathBuf>,
    pub cpu_log: Option<PathBuf>,
    pub executor_stderr: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct FetchedLogs {
    pub output_dir: PathBuf,
    pub app_id: String,
    pub workers: Vec<WorkerFetch>,
}

fn ssh(config: &ClusterConfig, host: &str, remote_command: &str) -> Result<String, String> {
    command::run_shell(
        &format!(
            "ssh -o StrictHostKeyChecking=no -i {} {}@{} '{}'",
            config.key_path, config.user, host, remote_command
        ),
        TRANSFER_TIMEOUT_SECS,
    )
}

fn scp_from(
    config: &ClusterConfig,
    host: &str,
    remote_path: &str,
    local_path: &Path,
) -> Result<(), String> {
    command::run_shell(
        &format!(
            "scp -o StrictHostKeyChecking=no -i {} {}@{}:{} {}",
            config.key_path,
            config.user,
            host,
            remote_path,
            local_path.display()
        ),
        TRANSFER_TIMEOUT_SECS,
    )
    .map(|_| ())
}

fn list_remote_dir(config: &ClusterConfig, host: &str, dir: &str) -> Result<Vec<String>, String> {
    let listing = ssh(config, host, &format!("ls -1 {dir}"))?;
    Ok(listing
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Fetch the master's logs: every file in the spark-events directory (compressed remotely before
/// the copy; event logs are large and repetitive) and every report file next to it, except the
/// benchmark report.  The event file name is the application id.  Returns the output directory,
/// which gains one subdirectory per application, and the id.

pub fn fetch_master(
    config: &ClusterConfig,
    log_folder: &str,
    output_folder: &Path,
    verbose: bool,
) -> Result<(PathBuf, String)> {
    let spark_home = config.spark_home.trim_end_matches('/');
    let events_dir = format!("{spark_home}/spark-events");
    let events = list_remote_dir(config, &config.master, &events_dir)
        .map_err(|e| anyhow!("Cannot list {events_dir} on {}: {e}", config.master))?;

    let mut app_id = "".to_string();
    let mut output_dir = output_folder.to_path_buf();
    for file in &events {
        if verbose {
            eprintln!("event log: {file}");
        }
        app_id = file.clone();
        output_dir = output_folder.join(&app_id);
        fs::create_dir_all(&output_dir)?;
        let remote = format!("{events_dir}/{file}");
        let remote_bz = format!("{remote}.bz");
        ssh(
            config,
            &config.master,
            &format!("pbzip2 -9 -p{} -c {remote} > {remote_bz}", config.cores_per_node),
        )
        .map_err(|e| anyhow!("Cannot compress {remote} on {}: {e}", config.master))?;
        scp_from(config, &config.master, &remote_bz, &output_dir.join(format!("{file}.bz")))
            .map_err(|e| anyhow!("Cannot copy {remote_bz} from {}: {e}", config.master))?;
    }
    if app_id.is_empty() {
        bail!("No event log found in {events_dir} on {}", config.master);
    }

    for file in list_remote_dir(config, &config.master, log_folder)
        .map_err(|e| anyhow!("Cannot list {log_folder} on {}: {e}", config.master))?
    {
        if file == "bench-report.dat" {
            continue;
        }
        // Colons in remote names do not survive as local file names everywhere.
        let local = output_dir.join(file.replace(':', "-"));
        if let Err(e) = scp_from(config, &config.master, &format!("{log_folder}/{file}"), &local) {
            eprintln!("{file} not retrieved from {}: {e}", config.master);
        }
    }
    Ok((output_dir, app_id))
}

/// Fetch one worker's logs: the controller output embedded in the worker log, the sar telemetry
/// log, and the stderr of every executor the application ran on the node.  Missing files are
/// reported and skipped.

pub fn fetch_worker(
    config: &ClusterConfig,
    node: &str,
    output_dir: &Path,
    app_id: &str,
    verbose: bool,
) -> WorkerFetch {
    if verbose {
        eprintln!("Downloading log from worker: {node}");
    }
    let mut fetched = WorkerFetch {
        node: node.to_string(),
        worker_log: None,
        cpu_log: None,
        executor_stderr: vec![],
    };
    let spark_home = config.spark_home.trim_end_matches('/');

    let log_name = format!(
        "spark-{}-org.apache.spark.deploy.worker.Worker-1-ip-{}.out",
        config.user,
        node.replace('.', "-")
    );
    let local_log = output_dir.join(&log_name);
    match scp_from(config, node, &format!("{spark_home}/logs/{log_name}"), &local_log) {
        Ok(()) => fetched.worker_log = Some(local_log),
        Err(e) => eprintln!("worker log not found on {node}: {e}"),
    }

    let sar_name = format!("sar-{node}.log");
    let local_sar = output_dir.join(&sar_name);
    match scp_from(config, node, &sar_name, &local_sar) {
        Ok(()) => fetched.cpu_log = Some(local_sar),
        Err(e) => eprintln!("cpu log not found on {node}: {e}"),
    }

    // Executor stderr files live under the application's work tree.
    let work_dir = format!("{spark_home}/work/{app_id}");
    match list_remote_dir(config, node, &work_dir) {
        Ok(executors) => {
            for executor in executors {
                let local = output_dir.join(format!("{node}-{executor}.stderr"));
                match scp_from(config, node, &format!("{work_dir}/{executor}/stderr"), &local) {
                    Ok(()) => fetched.executor_stderr.push(local),
                    Err(e) => eprintln!("stderr not found for executor {executor} on {node}: {e}"),
                }
            }
        }
        Err(e) => eprintln!("work tree not found on {node}: {e}"),
    }
    fetched
}

/// Fetch the whole cluster: the master first (it determines the application id and the output
/// directory), then every worker node, concurrently across a pool bounded by the local core
/// count.

pub fn fetch_cluster(
    config: &ClusterConfig,
    log_folder: Option<&str>,
    output_folder: &Path,
    verbose: bool,
) -> Result<FetchedLogs> {
    let Some(log_folder) = log_folder.or(config.log_folder.as_deref()) else {
        bail!("No log folder given on the command line or in the configuration")
    };
    if verbose {
        eprintln!("Downloading log from master: {}", config.master);
    }
    let (output_dir, app_id) = fetch_master(config, log_folder, output_folder, verbose)?;

    let pool = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let mut workers = Vec::with_capacity(config.workers.len());
    for batch in config.workers.chunks(pool) {
        let results = thread::scope(|s| {
            let handles = batch
                .iter()
                .map(|node| {
                    let output_dir = &output_dir;
                    let app_id = &app_id;
                    s.spawn(move || fetch_worker(config, node, output_dir, app_id, verbose))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<Vec<_>>()
        });
        for r in results {
            match r {
                Ok(w) => workers.push(w),
                Err(_) => bail!("A worker download task panicked"),
            }
        }
    }
    Ok(FetchedLogs {
        output_dir,
        app_id,
        workers,
    })
}
