/// Parser for the sar system-monitor report, and the merge of its samples into a worker record.
///
/// The report is a fixed-column table: `[time, cpu, %util, ...]`, columns aligned with runs of
/// spaces, the time field a bare "hh:mm:ss AM/PM".  Telemetry is worker-wide, not scoped to an
/// application; samples are appended in file order to the worker-global series and correlated
/// downstream by timestamp range against stage time spans.
///
/// The utilization column is a percentage of one core.  It is converted to an absolute core count
/// with `pct * cores_per_node * threading_factor / 100`, where the threading factor is 2 when the
/// node class has hyperthreading enabled, rounded to 2 decimal digits.
use crate::configs::ClusterConfig;
use crate::dates::{self, Timestamp};
use crate::records::WorkerLog;

use anyhow::Result;
use itertools::Itertools;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Convert a sampled utilization percentage of one core into an absolute core count for the node
/// class, rounded to 2 decimals.

pub fn cpu_cores_used(pct: f64, cores_per_node: usize, hyperthreading: bool) -> f64 {
    let threading_factor = if hyperthreading { 2.0 } else { 1.0 };
    let cores = pct * cores_per_node as f64 * threading_factor / 100.0;
    (cores * 100.0).round() / 100.0
}

/// Parse a sar report into (times, utilizations).  Headers, continuation blanks, and the trailing
/// "Average:" summary are skipped; a data line that fails a format expectation is dropped and
/// counted.

pub fn parse_sar_records<R: BufRead>(
    input: R,
    config: &ClusterConfig,
) -> Result<(Vec<Timestamp>, Vec<f64>, usize)> {
    let mut time_cpu = vec![];
    let mut cpu_real = vec![];
    let mut discarded: usize = 0;
    for line in input.lines() {
        let line = line?;
        // Columns are separated by runs of spaces; a single space is part of a field
        // ("06:45:01 PM").
        let fields = line
            .split("  ")
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect_vec();
        if fields.is_empty() {
            continue;
        }
        if fields[0].split(' ').any(|w| w == "Linux") || fields[0] == "Average:" {
            continue;
        }
        if fields.get(1) == Some(&"CPU") {
            continue;
        }
        let Some(util_field) = fields.get(2) else {
            discarded += 1;
            continue;
        };
        let Ok(t) = dates::parse_clock_time(fields[0], config.reference_date) else {
            discarded += 1;
            continue;
        };
        let Ok(pct) = util_field.parse::<f64>() else {
            discarded += 1;
            continue;
        };
        time_cpu.push(t);
        cpu_real.push(cpu_cores_used(
            pct,
            config.cores_per_node,
            config.hyperthreading,
        ));
    }
    Ok((time_cpu, cpu_real, discarded))
}

/// Append a sar report's samples to the worker-global series.  Returns the number of discarded
/// records.

pub fn merge_telemetry(log: &mut WorkerLog, file_name: &str, config: &ClusterConfig) -> Result<usize> {
    let file = File::open(file_name)?;
    let (mut time_cpu, mut cpu_real, discarded) = parse_sar_records(BufReader::new(file), config)?;
    log.time_cpu.append(&mut time_cpu);
    log.cpu_real.append(&mut cpu_real);
    Ok(discarded)
}

#[cfg(test)]
fn test_config(cores_per_node: usize, hyperthreading: bool) -> ClusterConfig {
    ClusterConfig {
        master: "master".to_string(),
        workers: vec![],
        user: "ubuntu".to_string(),
        key_path: "key.pem".to_string(),
        spark_home: "/usr/local/spark".to_string(),
        log_folder: None,
        cores_per_node,
        hyperthreading,
        reference_date: chrono::NaiveDate::from_ymd_opt(2016, 3, 14).unwrap(),
    }
}

#[test]
fn test_cpu_cores_used() {
    assert!(cpu_cores_used(50.0, 4, false) == 2.00);
    assert!(cpu_cores_used(50.0, 4, true) == 4.00);
    // Rounds to 2 decimals
    assert!(cpu_cores_used(12.345, 8, false) == 0.99);
}

// This tests:
//  - header, blank, column-header, and Average: lines are skipped
//  - times resolve against the reference date, utilization converts to cores

#[test]
fn test_parse_sar_records() {
    let text = "\
Linux 4.4.0-59-generic (ip-172-31-1-4) \t03/14/2016 \t_x86_64_\t(8 CPU)

06:45:01 PM     CPU     %user     %nice   %system   %iowait    %steal     %idle
06:45:11 PM     all     50.00      0.00      2.00      0.10      0.00     47.90
06:45:21 PM     all     25.00      0.00      1.00      0.05      0.00     73.95
Average:        all     37.50      0.00      1.50      0.07      0.00     60.93
";
    let (times, cpus, discarded) = parse_sar_records(text.as_bytes(), &test_config(4, false)).unwrap();
    assert!(discarded == 0);
    assert!(
        times
            == vec![
                dates::timestamp_from_ymdhms(2016, 3, 14, 18, 45, 11),
                dates::timestamp_from_ymdhms(2016, 3, 14, 18, 45, 21),
            ]
    );
    assert!(cpus == vec![2.00, 1.00]);
}

// This tests:
//  - a data line with a non-numeric utilization field is dropped and counted

#[test]
fn test_parse_sar_malformed() {
    let text = "\
06:45:11 PM     all     fifty      0.00      2.00      0.10      0.00     47.90
06:45:21 PM     all     25.00      0.00      1.00      0.05      0.00     73.95
";
    let (times, cpus, discarded) = parse_sar_records(text.as_bytes(), &test_config(4, true)).unwrap();
    assert!(discarded == 1);
    assert!(times.len() == 1);
    assert!(cpus == vec![2.00]);
}
