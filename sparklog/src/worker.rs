/// Single-pass stateful parser for a worker node's controller log, and the entry point that
/// merges the node's sar telemetry into the result.
///
/// The controller log is the worker-side log source: it records the controller's per-stage core
/// allocation decisions and progress reports.  As in the driver parser, lines are tokenized on
/// whitespace and matched positionally, token-index matching is confined to `classify`, and
/// malformed or contextless lines are dropped and counted rather than aborting the pass.
///
/// The worker log carries no registration events; the current application context switches on
/// scale events, and an application first seen in a scale event is registered implicitly.  An
/// application that ends the pass with no stage entries left no signal on this worker and is
/// pruned from the result.
use crate::configs::ClusterConfig;
use crate::dates::{self, Timestamp};
use crate::records::WorkerLog;
use crate::sar;

use anyhow::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use ustr::Ustr;

/// A recognized worker-log event.

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// The controller created an allocation for a stage; opens a new stage context.
    AllocationCreated { stage_id: u32, cores: f64 },

    /// The executor was scaled on behalf of another application; switches the context.
    Scaled { app_id: Ustr },

    /// The controller issued another core-allocation decision for the current stage.
    CoreToAllocate { cores: f64 },

    /// A measured speedup sample for the current stage.
    RealSpeedup { value: f64 },

    /// A progress sample for the current stage.
    Progress { value: f64 },
}

/// Progress samples use an alternate encoding where a negative value carries a percentage rather
/// than a fraction; normalize to a fraction.

pub fn normalize_progress(value: f64) -> f64 {
    if value < 0.0 {
        value.abs() / 100.0
    } else {
        value
    }
}

enum Classified {
    Event(Timestamp, WorkerEvent),
    Uninteresting,
    Malformed,
}

fn uint_field(fields: &[&str], i: usize) -> Option<u32> {
    fields.get(i)?.parse::<u32>().ok()
}

fn classify(fields: &[&str]) -> Classified {
    if fields.len() <= 3 {
        return Classified::Uninteresting;
    }
    let last = fields[fields.len() - 1];
    // Every recognized event carries at least 5 tokens.
    let Some(&action) = fields.get(4) else {
        return Classified::Uninteresting;
    };
    let event = match action {
        "Created" => match (uint_field(fields, 8), last.parse::<f64>().ok()) {
            (Some(stage_id), Some(cores)) => WorkerEvent::AllocationCreated { stage_id, cores },
            _ => return Classified::Malformed,
        },
        "Scaled" => match fields.get(10) {
            Some(&app_id) => WorkerEvent::Scaled {
                app_id: Ustr::from(app_id),
            },
            None => return Classified::Malformed,
        },
        "CoreToAllocate:" => match last.parse::<f64>() {
            Ok(cores) => WorkerEvent::CoreToAllocate { cores },
            Err(_) => return Classified::Malformed,
        },
        "Real:" => match last.parse::<f64>() {
            Ok(value) => WorkerEvent::RealSpeedup { value },
            Err(_) => return Classified::Malformed,
        },
        "SP" => match last.parse::<f64>() {
            Ok(value) => WorkerEvent::Progress { value },
            Err(_) => return Classified::Malformed,
        },
        _ => return Classified::Uninteresting,
    };
    match dates::parse_log_timestamp(fields[0], fields[1]) {
        Ok(t) => Classified::Event(t, event),
        Err(_) => Classified::Malformed,
    }
}

/// Parser context: the application and stage the controller is currently reporting for.

struct WorkerContext {
    app: Option<Ustr>,
    stage: Option<u32>,
}

/// Fold one event into the accumulating records.  Returns false when the event had to be dropped
/// for want of an application or stage context.

fn apply(log: &mut WorkerLog, ctx: &mut WorkerContext, t: Timestamp, event: WorkerEvent) -> bool {
    match event {
        WorkerEvent::Scaled { app_id } => {
            if ctx.app != Some(app_id) {
                // No registration events exist in this log; first mention registers the app.
                log.apps.entry(app_id).or_default();
                ctx.app = Some(app_id);
                ctx.stage = None;
            }
            true
        }
        WorkerEvent::AllocationCreated { stage_id, cores } => {
            let Some(app_id) = ctx.app else {
                return false;
            };
            let samples = log
                .apps
                .entry(app_id)
                .or_default()
                .entry(stage_id)
                .or_default();
            ctx.stage = Some(stage_id);
            samples.cpu_allocated.push(cores);
            samples.speedup_real.push(0.0);
            samples.time.push(t);
            samples.speedup_target.push(0.0);
            true
        }
        other => {
            let (Some(app_id), Some(stage_id)) = (ctx.app, ctx.stage) else {
                return false;
            };
            let samples = log
                .apps
                .entry(app_id)
                .or_default()
                .entry(stage_id)
                .or_default();
            match other {
                WorkerEvent::CoreToAllocate { cores } => {
                    samples.cpu_allocated.push(cores);
                }
                WorkerEvent::RealSpeedup { value } => {
                    samples.speedup_real.push(value);
                }
                WorkerEvent::Progress { value } => {
                    samples.time.push(t);
                    samples.speedup_target.push(normalize_progress(value));
                }
                _ => {
                    panic!("Unexpected")
                }
            }
            true
        }
    }
}

/// Drop applications that ended the pass with no stage entries: nothing of that application ran
/// on this worker.

pub fn prune_idle_apps(log: &mut WorkerLog) {
    log.apps.retain(|_, stages| !stages.is_empty());
}

/// Parse a worker controller log into a WorkerLog (telemetry series left empty).  Return an error
/// in the case of I/O errors, but silently drop records with parse errors.  Returns the number of
/// discarded records alongside.

pub fn parse_worker_log(file_name: &str) -> Result<(WorkerLog, usize)> {
    let file = File::open(file_name)?;
    parse_worker_records(BufReader::new(file))
}

pub fn parse_worker_records<R: BufRead>(input: R) -> Result<(WorkerLog, usize)> {
    let mut log = WorkerLog::default();
    let mut ctx = WorkerContext {
        app: None,
        stage: None,
    };
    let mut discarded: usize = 0;
    for line in input.lines() {
        let line = line?;
        let fields = line.split_whitespace().collect::<Vec<&str>>();
        match classify(&fields) {
            Classified::Event(t, event) => {
                if !apply(&mut log, &mut ctx, t, event) {
                    discarded += 1;
                }
            }
            Classified::Uninteresting => {}
            Classified::Malformed => {
                discarded += 1;
            }
        }
    }
    Ok((log, discarded))
}

/// Load one worker's data: the controller log, then the node's sar telemetry merged into the same
/// record, then the idle-application pruning.  Returns the total number of discarded records.

pub fn load_worker_data(
    worker_log: &str,
    cpu_log: &str,
    config: &ClusterConfig,
) -> Result<(WorkerLog, usize)> {
    let (mut log, mut discarded) = parse_worker_log(worker_log)?;
    discarded += sar::merge_telemetry(&mut log, cpu_log, config)?;
    prune_idle_apps(&mut log);
    Ok((log, discarded))
}

#[cfg(test)]
fn ts(h: u32, mi: u32, s: u32) -> Timestamp {
    dates::timestamp_from_ymdhms(2016, 3, 14, h, mi, s)
}

// This tests:
//  - context switching on scale events and implicit registration
//  - the allocation / reallocation / speedup / progress series
//  - progress normalization of the negative-percentage encoding

#[test]
fn test_worker_scenario() {
    let text = "\
16/03/14 18:45:12 INFO Worker: Scaled executor cores for running app app-1
16/03/14 18:45:14 INFO ControllerExecutor: Created controller for stage 0 with deadline 122500 core 8.0
16/03/14 18:45:20 INFO ControllerExecutor: CoreToAllocate: 6.0
16/03/14 18:45:21 INFO ControllerExecutor: Real: 0.85
16/03/14 18:45:21 INFO ControllerExecutor: SP 0.7
16/03/14 18:45:24 INFO ControllerExecutor: SP -45.0
";
    let (log, discarded) = parse_worker_records(text.as_bytes()).unwrap();
    assert!(discarded == 0);
    let samples = log
        .apps
        .get(&Ustr::from("app-1"))
        .unwrap()
        .get(&0)
        .unwrap();
    assert!(samples.cpu_allocated == vec![8.0, 6.0]);
    assert!(samples.speedup_real == vec![0.0, 0.85]);
    assert!(samples.speedup_target == vec![0.0, 0.7, 0.45]);
    assert!(samples.time == vec![ts(18, 45, 14), ts(18, 45, 21), ts(18, 45, 24)]);
}

#[test]
fn test_normalize_progress() {
    assert!(normalize_progress(-45.0) == 0.45);
    assert!(normalize_progress(0.7) == 0.7);
    assert!(normalize_progress(0.0) == 0.0);
}

// This tests:
//  - events before any application or stage context are dropped and counted

#[test]
fn test_worker_missing_context() {
    let text = "\
16/03/14 18:45:10 INFO ControllerExecutor: Created controller for stage 0 with deadline 122500 core 8.0
16/03/14 18:45:11 INFO ControllerExecutor: SP 0.5
16/03/14 18:45:12 INFO Worker: Scaled executor cores for running app app-1
16/03/14 18:45:13 INFO ControllerExecutor: CoreToAllocate: 4.0
16/03/14 18:45:14 INFO ControllerExecutor: Created controller for stage 0 with deadline 122500 core 8.0
";
    let (log, discarded) = parse_worker_records(text.as_bytes()).unwrap();
    // Created and SP before the scale event, CoreToAllocate before any stage context.
    assert!(discarded == 3);
    let samples = log
        .apps
        .get(&Ustr::from("app-1"))
        .unwrap()
        .get(&0)
        .unwrap();
    assert!(samples.cpu_allocated == vec![8.0]);
}

// This tests:
//  - an application with no stage entries is pruned from the final record

#[test]
fn test_worker_pruning() {
    let text = "\
16/03/14 18:45:12 INFO Worker: Scaled executor cores for running app app-1
16/03/14 18:45:14 INFO ControllerExecutor: Created controller for stage 0 with deadline 122500 core 8.0
16/03/14 18:50:02 INFO Worker: Scaled executor cores for running app app-2
";
    let (mut log, _) = parse_worker_records(text.as_bytes()).unwrap();
    assert!(log.apps.len() == 2);
    prune_idle_apps(&mut log);
    assert!(log.apps.len() == 1);
    assert!(log.apps.contains_key(&Ustr::from("app-1")));
}

// This tests:
//  - re-parsing an identical log yields identical structured output

#[test]
fn test_worker_idempotence() {
    let text = "\
16/03/14 18:45:12 INFO Worker: Scaled executor cores for running app app-1
16/03/14 18:45:14 INFO ControllerExecutor: Created controller for stage 0 with deadline 122500 core 8.0
16/03/14 18:45:21 INFO ControllerExecutor: SP 0.7
";
    let (first, d1) = parse_worker_records(text.as_bytes()).unwrap();
    let (second, d2) = parse_worker_records(text.as_bytes()).unwrap();
    assert!(first == second);
    assert!(d1 == d2);
}
