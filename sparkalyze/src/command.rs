// Run a shell command (in practice: the local ssh/scp binaries) with a timeout and safe handling
// of the communication.

use std::io;
use std::time::Duration;
use subprocess::{Exec, ExitStatus, Redirection};

/// Run `command` under the shell, returning its stdout on success and whatever diagnostics were
/// collected on failure.
///
/// The child's pipes have limited capacity and the child blocks once one fills up, so the pipes
/// must be drained while waiting for termination.  Each read is bounded by the timeout; a hung
/// transfer is terminated rather than waited on forever.

pub fn run_shell(command: &str, timeout_seconds: u64) -> Result<String, String> {
    let mut p = Exec::shell(command)
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Pipe)
        .popen()
        .map_err(|_| command.to_string())?;

    let mut comm = p
        .communicate_start(None)
        .limit_time(Duration::new(timeout_seconds, 0));
    let mut collected = "".to_string();
    let mut failed = false;
    loop {
        match comm.read_string() {
            Ok((Some(stdout), Some(stderr))) => {
                if !stderr.is_empty() {
                    // Command produced error output
                    collected += &stderr;
                    failed = true;
                    break;
                }
                if stdout.is_empty() {
                    // EOF; a timeout would have arrived as Err
                    break;
                }
                collected += &stdout;
            }
            Ok((_, _)) => {
                collected = "Internal error".to_string();
                failed = true;
                break;
            }
            Err(e) => {
                if e.error.kind() == io::ErrorKind::TimedOut {
                    let _ = p.terminate();
                    collected = format!("Timed out: {command}");
                } else {
                    collected = "Internal error".to_string();
                }
                failed = true;
                break;
            }
        }
    }

    match p.wait() {
        Ok(ExitStatus::Exited(0)) if !failed => Ok(collected),
        _ => Err(collected),
    }
}
