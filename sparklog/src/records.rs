/// The typed records produced by the log parsers.
///
/// The driver-side and worker-side structures are deliberately explicit record types with named,
/// documented fields rather than open-ended keyed containers; a missing field is a compile error
/// here, not a runtime KeyError deep in a scan.
///
/// Ownership is simple: each parser instance owns its accumulating record exclusively during the
/// scan and hands the finished value to the caller.  Nothing mutates a record after the owning
/// parse completes, so the records are trivially safe to ship across threads.
///
/// All records implement PartialEq so that re-parse idempotence is directly testable.
use crate::dates::Timestamp;

use std::collections::{BTreeMap, HashMap};
use ustr::Ustr;

/// One scheduling stage as seen from the driver log.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageRecord {
    /// Number of tasks the DAG scheduler submitted for the stage; zero until the submission event
    /// has been seen.
    pub task_count: u32,

    /// Time the external controller armed the stage, when observed.
    pub start: Option<Timestamp>,

    /// `start` plus the duration the controller declared, millisecond precision.
    pub deadline: Option<Timestamp>,

    /// Time the DAG scheduler reported the stage finished.  A stage is closed once this is set.
    pub end: Option<Timestamp>,

    /// One timestamp per completed task, in log (append) order.  Never longer than `task_count`
    /// for a well-formed log.
    pub task_timestamps: Vec<Timestamp>,
}

/// Per-application series of stage start, deadline, and finish times, in scheduling order.
///
/// Invariant after a full parse: `finished.len() <= started.len() <= deadlines.len() + 1`.  A
/// finish time is only appended while there remain started-but-unfinished stages, which is also
/// the guard against closing a stage twice.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSeries {
    pub started: Vec<Timestamp>,
    pub deadlines: Vec<Timestamp>,
    pub finished: Vec<Timestamp>,
}

/// One application's stage map and plot series.  Created the moment the application registers (or
/// is handed off to); accumulated, never deleted.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppRecord {
    pub stages: BTreeMap<u32, StageRecord>,
    pub series: StageSeries,
}

/// Everything extracted from one driver log.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverLog {
    pub apps: HashMap<Ustr, AppRecord>,
}

/// The allocation/progress series for one (application, stage) pair on one worker.
///
/// `cpu_allocated` collects the controller's core-allocation decisions; `speedup_real` the
/// measured speedup samples; `speedup_target` the normalized progress samples, with one entry in
/// `time` per progress sample.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSamples {
    pub cpu_allocated: Vec<f64>,
    pub time: Vec<Timestamp>,
    pub speedup_real: Vec<f64>,
    pub speedup_target: Vec<f64>,
}

/// Everything extracted from one worker node.
///
/// The CPU series are worker-global, not scoped to an application: telemetry is sampled for the
/// whole node and is correlated downstream by timestamp range against stage time spans.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerLog {
    pub apps: HashMap<Ustr, BTreeMap<u32, StageSamples>>,
    pub cpu_real: Vec<f64>,
    pub time_cpu: Vec<Timestamp>,
}
