/// Print the allocation/progress series extracted from a worker's controller log, and the
/// worker-global cpu series, as csv.
use anyhow::Result;
use itertools::Itertools;
use sparklog::{Timestamp, WorkerLog};
use std::io;
use ustr::Ustr;

fn format_time(t: &Timestamp) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// One row per (application, stage): sample counts plus the latest allocation and progress
/// values, applications sorted by id for deterministic output.

pub fn print_worker_data(output: &mut dyn io::Write, log: &WorkerLog) -> Result<()> {
    let mut w = csv::Writer::from_writer(output);
    w.write_record([
        "app",
        "stage",
        "allocations",
        "last_allocation",
        "progress_samples",
        "last_progress",
        "first_time",
        "last_time",
    ])?;
    let apps: Vec<&Ustr> = log.apps.keys().sorted().collect();
    for app_id in apps {
        for (stage_id, samples) in &log.apps[app_id] {
            let last_allocation = samples
                .cpu_allocated
                .last()
                .map(|v| v.to_string())
                .unwrap_or_default();
            let last_progress = samples
                .speedup_target
                .last()
                .map(|v| v.to_string())
                .unwrap_or_default();
            let first_time = samples.time.first().map(format_time).unwrap_or_default();
            let last_time = samples.time.last().map(format_time).unwrap_or_default();
            w.write_record(&[
                app_id.to_string(),
                stage_id.to_string(),
                samples.cpu_allocated.len().to_string(),
                last_allocation,
                samples.speedup_target.len().to_string(),
                last_progress,
                first_time,
                last_time,
            ])?;
        }
    }
    w.flush()?;
    Ok(())
}

/// One row per telemetry sample, in file order.

pub fn print_cpu_series(output: &mut dyn io::Write, log: &WorkerLog) -> Result<()> {
    let mut w = csv::Writer::from_writer(output);
    w.write_record(["time", "cpu_real"])?;
    for (t, cpu) in log.time_cpu.iter().zip(log.cpu_real.iter()) {
        w.write_record([&format_time(t), &cpu.to_string()])?;
    }
    w.flush()?;
    Ok(())
}

// This tests:
//  - csv shape of the per-stage listing

#[test]
fn test_print_worker_data() {
    let text = "\
16/03/14 18:45:12 INFO Worker: Scaled executor cores for running app app-1
16/03/14 18:45:14 INFO ControllerExecutor: Created controller for stage 0 with deadline 122500 core 8.0
16/03/14 18:45:21 INFO ControllerExecutor: SP 0.7
";
    let (log, _) = sparklog::parse_worker_records(text.as_bytes()).unwrap();
    let mut buf = Vec::new();
    print_worker_data(&mut buf, &log).unwrap();
    let printed = String::from_utf8(buf).unwrap();
    let mut lines = printed.lines();
    assert!(
        lines.next().unwrap()
            == "app,stage,allocations,last_allocation,progress_samples,last_progress,first_time,last_time"
    );
    assert!(
        lines.next().unwrap()
            == "app-1,0,1,8,2,0.7,2016-03-14 18:45:14.000,2016-03-14 18:45:21.000"
    );
}
