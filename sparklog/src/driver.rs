/// Single-pass stateful parser for the driver (scheduler) log.
///
/// The driver log is append-only free text with log level INFO.  Event records are recognized by
/// positional token matching: lines are tokenized on whitespace, a line is a candidate event only
/// if it has more than 3 tokens, and the 4th token (the logging component) plus surrounding
/// tokens disambiguate the event kind.
///
/// Multiple applications interleave in one log.  The parser tracks exactly one current
/// application at a time and switches it only on explicit registration or hand-off events.
///
/// NOTE:
///
/// - It's an important feature of this parser that a malformed line is dropped silently and the
///   scan continues.  Appending-to-log is not atomic wrt reading-from-log, and the surrounding
///   free text is not under our control; the number of dropped records is returned so that a
///   caller who cares can be noisy about it.
///
/// - Token-index matching is confined to `classify`; state updates live in `apply` and deal only
///   in typed events.  Each half is independently testable.
use crate::dates::{self, Timestamp};
use crate::records::DriverLog;

use anyhow::Result;
use chrono::Duration;
use std::fs::File;
use std::io::{BufRead, BufReader};
use ustr::Ustr;

/// A recognized driver-log event.

#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// An application registered with the scheduler backend; becomes the current application.
    Connected { app_id: Ustr },

    /// The task-set tracker observed one task completion in a stage.
    TaskFinished { stage_id: u32 },

    /// The DAG scheduler submitted a stage with a task count.
    StageSubmitted { stage_id: u32, tasks: u32 },

    /// The DAG scheduler observed a stage completion.
    StageFinished { stage_id: u32 },

    /// The external controller armed a stage with a declared duration in milliseconds.
    ControllerInit { stage_id: u32, deadline_ms: f64 },

    /// The controller handed the scheduler over to another application.
    ControllerHandoff { app_id: Ustr },
}

enum Classified {
    Event(Timestamp, DriverEvent),
    Uninteresting,
    Malformed,
}

fn field_is(fields: &[&str], i: usize, v: &str) -> bool {
    fields.get(i) == Some(&v)
}

fn uint_field(fields: &[&str], i: usize) -> Option<u32> {
    fields.get(i)?.trim_end_matches(',').parse::<u32>().ok()
}

fn float_field(fields: &[&str], i: usize) -> Option<f64> {
    fields.get(i)?.trim_end_matches(',').parse::<f64>().ok()
}

/// Classify one tokenized line.  A line that resembles an event but fails an index or format
/// expectation is Malformed; anything else unrecognized is Uninteresting.

fn classify(fields: &[&str]) -> Classified {
    if fields.len() <= 3 {
        return Classified::Uninteresting;
    }
    let n = fields.len();
    let last = fields[n - 1];
    // Every recognized event carries at least 5 tokens.
    let Some(&action) = fields.get(4) else {
        return Classified::Uninteresting;
    };
    let event = match (fields[3], action) {
        ("StandaloneSchedulerBackend:", "Connected") => DriverEvent::Connected {
            app_id: Ustr::from(last),
        },
        ("TaskSetManager:", "Finished") => {
            // The stage id is logged as a float ("stage 0.0"); truncate it.
            match float_field(fields, 9) {
                Some(v) => DriverEvent::TaskFinished {
                    stage_id: v as u32,
                },
                None => return Classified::Malformed,
            }
        }
        ("DAGScheduler:", "Submitting") if field_is(fields, 6, "missing") => {
            match (uint_field(fields, 5), uint_field(fields, 10)) {
                (Some(tasks), Some(stage_id)) => DriverEvent::StageSubmitted { stage_id, tasks },
                _ => return Classified::Malformed,
            }
        }
        ("DAGScheduler:", _) if fields[n - 4] == "finished" => match uint_field(fields, 5) {
            Some(stage_id) => DriverEvent::StageFinished { stage_id },
            None => return Classified::Malformed,
        },
        ("ControllerJob:", _) if field_is(fields, 5, "INIT") => {
            match (uint_field(fields, 12), float_field(fields, 16)) {
                (Some(stage_id), Some(deadline_ms)) => DriverEvent::ControllerInit {
                    stage_id,
                    deadline_ms,
                },
                _ => return Classified::Malformed,
            }
        }
        ("ControllerJob:", "SEND") if field_is(fields, 5, "NEEDED") => {
            DriverEvent::ControllerHandoff {
                app_id: Ustr::from(last),
            }
        }
        _ => return Classified::Uninteresting,
    };
    match dates::parse_log_timestamp(fields[0], fields[1]) {
        Ok(t) => Classified::Event(t, event),
        Err(_) => Classified::Malformed,
    }
}

/// Parser context: the application the scheduler is currently serving.

struct DriverContext {
    current: Option<Ustr>,
}

/// Fold one event into the accumulating records.  Returns false when the event had to be dropped
/// for want of an application context.

fn apply(log: &mut DriverLog, ctx: &mut DriverContext, t: Timestamp, event: DriverEvent) -> bool {
    match event {
        DriverEvent::Connected { app_id } => {
            log.apps.entry(app_id).or_default();
            ctx.current = Some(app_id);
            true
        }
        DriverEvent::ControllerHandoff { app_id } => {
            if ctx.current != Some(app_id) {
                log.apps.entry(app_id).or_default();
                ctx.current = Some(app_id);
            }
            true
        }
        other => {
            let Some(app_id) = ctx.current else {
                return false;
            };
            let app = log.apps.entry(app_id).or_default();
            match other {
                DriverEvent::TaskFinished { stage_id } => {
                    // First task completion for an unsubmitted stage creates the record lazily.
                    app.stages
                        .entry(stage_id)
                        .or_default()
                        .task_timestamps
                        .push(t);
                }
                DriverEvent::StageSubmitted { stage_id, tasks } => {
                    app.stages.entry(stage_id).or_default().task_count = tasks;
                }
                DriverEvent::StageFinished { stage_id } => {
                    app.stages.entry(stage_id).or_default().end = Some(t);
                    // A finish is plotted only while there remain started-but-unfinished stages.
                    if app.series.finished.len() < app.series.started.len() {
                        app.series.finished.push(t);
                    }
                }
                DriverEvent::ControllerInit {
                    stage_id,
                    deadline_ms,
                } => {
                    // Deadline tracking never runs more than one stage ahead of the finish count.
                    if app.series.deadlines.len() < app.series.finished.len() + 1 {
                        let deadline = t + Duration::milliseconds(deadline_ms.round() as i64);
                        let stage = app.stages.entry(stage_id).or_default();
                        stage.start = Some(t);
                        stage.deadline = Some(deadline);
                        app.series.started.push(t);
                        app.series.deadlines.push(deadline);
                    }
                }
                _ => {
                    panic!("Unexpected")
                }
            }
            true
        }
    }
}

/// Parse a driver log into a DriverLog.  Return an error in the case of I/O errors, but silently
/// drop records with parse errors.  Returns the number of discarded records alongside.

pub fn parse_driver_log(file_name: &str) -> Result<(DriverLog, usize)> {
    let file = File::open(file_name)?;
    parse_driver_records(BufReader::new(file))
}

pub fn parse_driver_records<R: BufRead>(input: R) -> Result<(DriverLog, usize)> {
    let mut log = DriverLog::default();
    let mut ctx = DriverContext { current: None };
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

#[cfg(test)]
fn ts(h: u32, mi: u32, s: u32) -> Timestamp {
    dates::timestamp_from_ymdhms(2016, 3, 14, h, mi, s)
}

// This tests:
//  - the end-to-end synthetic scenario: registration, submission, controller INIT, ten task
//    completions, one stage finish
//  - deadline arithmetic at millisecond precision
//  - the series length invariant

#[test]
fn test_driver_scenario() {
    use itertools::Itertools;

    let text = "\
16/03/14 18:45:12 INFO StandaloneSchedulerBackend: Connected to Spark cluster with app ID app-1
16/03/14 18:45:13 INFO DAGScheduler: Submitting 10 missing tasks from ResultStage 0 (MapPartitionsRDD[1] at count at SparkPi.scala:36)
16/03/14 18:45:13 INFO ControllerJob: SEND INIT to executor controller, app app-1, stage 0, core 8, deadline 122500, tasks 10
16/03/14 18:45:14 INFO TaskSetManager: Finished task 0.0 in stage 0.0 (TID 0) in 812 ms on host-1 (1/10)
16/03/14 18:45:14 INFO TaskSetManager: Finished task 1.0 in stage 0.0 (TID 1) in 902 ms on host-1 (2/10)
16/03/14 18:45:15 INFO TaskSetManager: Finished task 2.0 in stage 0.0 (TID 2) in 1250 ms on host-2 (3/10)
16/03/14 18:45:16 INFO TaskSetManager: Finished task 3.0 in stage 0.0 (TID 3) in 1433 ms on host-2 (4/10)
16/03/14 18:45:17 INFO TaskSetManager: Finished task 4.0 in stage 0.0 (TID 4) in 1599 ms on host-1 (5/10)
16/03/14 18:45:18 INFO TaskSetManager: Finished task 5.0 in stage 0.0 (TID 5) in 1786 ms on host-2 (6/10)
16/03/14 18:45:19 INFO TaskSetManager: Finished task 6.0 in stage 0.0 (TID 6) in 1912 ms on host-1 (7/10)
16/03/14 18:45:20 INFO TaskSetManager: Finished task 7.0 in stage 0.0 (TID 7) in 2034 ms on host-2 (8/10)
16/03/14 18:45:21 INFO TaskSetManager: Finished task 8.0 in stage 0.0 (TID 8) in 2200 ms on host-1 (9/10)
16/03/14 18:45:23 INFO TaskSetManager: Finished task 9.0 in stage 0.0 (TID 9) in 2455 ms on host-2 (10/10)
16/03/14 18:45:25 INFO DAGScheduler: ResultStage 0 (count at SparkPi.scala:36) finished in 12.318 s
";
    let (log, discarded) = parse_driver_records(text.as_bytes()).unwrap();
    assert!(discarded == 0);
    assert!(log.apps.len() == 1);

    let app = log.apps.get(&Ustr::from("app-1")).unwrap();
    let stage = app.stages.get(&0).unwrap();
    assert!(stage.task_count == 10);
    assert!(stage.task_timestamps.len() == 10);
    assert!(stage
        .task_timestamps
        .iter()
        .tuple_windows()
        .all(|(a, b)| a <= b));
    assert!(stage.start == Some(ts(18, 45, 13)));
    assert!(stage.deadline == Some(ts(18, 45, 13) + Duration::milliseconds(122500)));
    assert!(stage.end == Some(ts(18, 45, 25)));

    assert!(app.series.started == vec![ts(18, 45, 13)]);
    assert!(app.series.deadlines == vec![ts(18, 45, 13) + Duration::milliseconds(122500)]);
    assert!(app.series.finished == vec![ts(18, 45, 25)]);
    assert!(app.series.finished.len() <= app.series.started.len());
    assert!(app.series.started.len() <= app.series.deadlines.len() + 1);
}

// This tests:
//  - the INIT guard: a second INIT is ignored until a finish catches up

#[test]
fn test_driver_init_guard() {
    let text = "\
16/03/14 18:45:12 INFO StandaloneSchedulerBackend: Connected to Spark cluster with app ID app-1
16/03/14 18:45:13 INFO ControllerJob: SEND INIT to executor controller, app app-1, stage 0, core 8, deadline 1000, tasks 4
16/03/14 18:45:14 INFO ControllerJob: SEND INIT to executor controller, app app-1, stage 1, core 8, deadline 2000, tasks 4
16/03/14 18:45:15 INFO DAGScheduler: ResultStage 0 (count at SparkPi.scala:36) finished in 2.0 s
16/03/14 18:45:16 INFO ControllerJob: SEND INIT to executor controller, app app-1, stage 1, core 8, deadline 2000, tasks 4
";
    let (log, _) = parse_driver_records(text.as_bytes()).unwrap();
    let app = log.apps.get(&Ustr::from("app-1")).unwrap();
    // The second line's INIT was dropped by the guard; stage 1 is armed by the retry only.
    assert!(app.series.started == vec![ts(18, 45, 13), ts(18, 45, 16)]);
    assert!(app.stages.get(&1).unwrap().start == Some(ts(18, 45, 16)));
    assert!(app.series.finished.len() <= app.series.started.len());
    assert!(app.series.started.len() <= app.series.deadlines.len() + 1);
}

// This tests:
//  - hand-off context switching between interleaved applications
//  - that a hand-off back to a known application does not wipe its state

#[test]
fn test_driver_handoff() {
    let text = "\
16/03/14 18:45:12 INFO StandaloneSchedulerBackend: Connected to Spark cluster with app ID app-1
16/03/14 18:45:13 INFO DAGScheduler: Submitting 4 missing tasks from ResultStage 0 (MapPartitionsRDD[1] at count at SparkPi.scala:36)
16/03/14 18:45:14 INFO ControllerJob: SEND NEEDED control to app app-2
16/03/14 18:45:15 INFO DAGScheduler: Submitting 8 missing tasks from ResultStage 0 (MapPartitionsRDD[1] at count at SparkPi.scala:36)
16/03/14 18:45:16 INFO ControllerJob: SEND NEEDED control to app app-1
16/03/14 18:45:17 INFO DAGScheduler: Submitting 6 missing tasks from ResultStage 1 (MapPartitionsRDD[2] at count at SparkPi.scala:40)
";
    let (log, discarded) = parse_driver_records(text.as_bytes()).unwrap();
    assert!(discarded == 0);
    assert!(log.apps.len() == 2);
    let app1 = log.apps.get(&Ustr::from("app-1")).unwrap();
    let app2 = log.apps.get(&Ustr::from("app-2")).unwrap();
    assert!(app1.stages.get(&0).unwrap().task_count == 4);
    assert!(app1.stages.get(&1).unwrap().task_count == 6);
    assert!(app2.stages.get(&0).unwrap().task_count == 8);
}

// This tests:
//  - malformed event-shaped lines are dropped and counted, never fatal
//  - events with no application context are dropped and counted

#[test]
fn test_driver_malformed() {
    let text = "\
16/03/14 18:45:10 INFO TaskSetManager: Finished task 0.0 in stage 0.0 (TID 0) in 812 ms on host-1 (1/4)
16/03/14 18:45:12 INFO StandaloneSchedulerBackend: Connected to Spark cluster with app ID app-1
16/03/14 18:45:13 INFO TaskSetManager: Finished task
16/03/14 bogus INFO DAGScheduler: ResultStage 0 (count at SparkPi.scala:36) finished in 2.0 s
16/03/14 18:45:14 INFO TaskSetManager: Finished task 0.0 in stage 0.0 (TID 0) in 812 ms on host-1 (1/4)
16/03/14 18:45:15 INFO BlockManagerInfo: Added broadcast_0_piece0 in memory on host-1:44303
";
    let (log, discarded) = parse_driver_records(text.as_bytes()).unwrap();
    // One contextless task finish, one truncated line, one bad timestamp.
    assert!(discarded == 3);
    let app = log.apps.get(&Ustr::from("app-1")).unwrap();
    assert!(app.stages.get(&0).unwrap().task_timestamps == vec![ts(18, 45, 14)]);
}

// This tests:
//  - re-parsing an identical log yields identical structured output

#[test]
fn test_driver_idempotence() {
    let text = "\
16/03/14 18:45:12 INFO StandaloneSchedulerBackend: Connected to Spark cluster with app ID app-1
16/03/14 18:45:13 INFO ControllerJob: SEND INIT to executor controller, app app-1, stage 0, core 8, deadline 122500, tasks 10
16/03/14 18:45:14 INFO TaskSetManager: Finished task 0.0 in stage 0.0 (TID 0) in 812 ms on host-1 (1/10)
16/03/14 18:45:25 INFO DAGScheduler: ResultStage 0 (count at SparkPi.scala:36) finished in 12.318 s
";
    let (first, d1) = parse_driver_records(text.as_bytes()).unwrap();
    let (second, d2) = parse_driver_records(text.as_bytes()).unwrap();
    assert!(first == second);
    assert!(d1 == d2);
}
