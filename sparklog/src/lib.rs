/// An xSpark run leaves three families of log files behind on the cluster: the driver (scheduler)
/// log on the coordinator node, one controller log per worker node, and one sar telemetry log per
/// worker node.  The three sources are free text, use different clocks and time formats, and
/// interleave records for multiple concurrently running applications.
///
/// This library has as its fundamental task to reconstruct a unified scheduling timeline from
/// those raw logs: per-stage submission, deadline, and completion times on the driver side, and
/// per-stage core-allocation / progress series on each worker side, merged with independently
/// sampled CPU-utilization telemetry.  The task breaks down into a number of subtasks:
///
/// - Normalize the heterogeneous textual timestamps into one comparable representation.
///
/// - Scan the driver log once, classifying each line into a typed event and folding the events
///   into per-application, per-stage records.
///
/// - Scan a worker's controller log once, ditto, and attach the worker's telemetry series.
///
/// - Tolerate missing, reordered, or malformed records: individual bad lines are dropped and
///   counted, they never abort a pass.  The logs are uncontrolled free text and partial,
///   best-effort extraction is deliberately favored over strict validation.
///
/// Retrieval of the files from the cluster is not this library's concern; the parsers accept a
/// readable text stream and hand back structured records.
mod configs;
mod dates;
mod driver;
mod records;
mod sar;
mod worker;

// Types and utilities for manipulating timestamps.

pub use dates::Timestamp;

// "A long long time ago".

pub use dates::epoch;

// The time right now.

pub use dates::now;

// A time that should not be in any log record.

pub use dates::far_future;

// Given year, month, day (all UTC), return a Timestamp.

pub use dates::timestamp_from_ymd;

// Given year, month, day, hour, minute, second (all UTC), return a Timestamp.

pub use dates::timestamp_from_ymdhms;

// Parse the date+time fields leading a driver or worker log line.

pub use dates::parse_log_timestamp;

// Parse a time-of-day field ("hh:mm:ss AM/PM") against a fixed reference date.

pub use dates::parse_clock_time;

// The reference date assumed when a log source carries no date information.

pub use dates::default_reference_date;

// Per-stage record built from the driver log: task count, start, deadline, end, and one timestamp
// per completed task.

pub use records::StageRecord;

// Per-application plot series: stage start, deadline, and finish times in scheduling order.

pub use records::StageSeries;

// One application's stage map and plot series.

pub use records::AppRecord;

// Everything extracted from one driver log: a map from application id to AppRecord.

pub use records::DriverLog;

// Per-(application, stage) allocation/progress series built from a worker's controller log.

pub use records::StageSamples;

// Everything extracted from one worker: per-app, per-stage samples plus the worker-global
// CPU-utilization series.

pub use records::WorkerLog;

// A typed driver-log event, and the classifier producing it from a tokenized line.

pub use driver::DriverEvent;

// Parse a driver log file (or an in-memory stream) into a DriverLog, returning the number of
// discarded records alongside.

pub use driver::parse_driver_log;
pub use driver::parse_driver_records;

// A typed worker-log event.

pub use worker::WorkerEvent;

// Parse a worker controller log file (or an in-memory stream) into a WorkerLog.

pub use worker::parse_worker_log;
pub use worker::parse_worker_records;

// Parse a worker controller log, merge the node's sar telemetry into it, and prune applications
// that left no signal on the worker.

pub use worker::load_worker_data;

// Normalize a progress sample from its alternate negative-percentage encoding.

pub use worker::normalize_progress;

// Drop applications that ended a worker pass with no stage entries.

pub use worker::prune_idle_apps;

// Parse a sar system-monitor report into time/utilization series.

pub use sar::parse_sar_records;

// Append a sar report's series to a WorkerLog.

pub use sar::merge_telemetry;

// Convert a sampled utilization percentage into an absolute core count.

pub use sar::cpu_cores_used;

// The cluster configuration: node names, retrieval credentials, and the options scaling the
// telemetry conversion.

pub use configs::ClusterConfig;

// Read the cluster configuration from a JSON file.

pub use configs::read_cluster_config;
