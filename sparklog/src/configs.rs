/// Read the cluster configuration from a json file.
///
/// The file format is a single object { ... } with the following named fields and value types:
///
///   master - string, dns name or address of the coordinator node
///   workers - array of strings, the worker nodes
///   user - string, optional, remote user name for log retrieval (default "ubuntu")
///   key_path - string, ssh identity file used for retrieval
///   spark_home - string, the installation root on every node
///   log_folder - string, optional, remote folder holding the run's report files
///   cores_per_node - integer, physical cores per node; scales the telemetry
///                    utilization conversion
///   hyperthreading - bool, optional, doubles the core multiplier (default false)
///   reference_date - string "YYYY-MM-DD", optional, the date assumed for
///                    time-of-day-only telemetry logs (default 2016-01-01)
///
/// Since the input is human-generated and has optional fields, the generic JSON parser followed
/// by explicit decoding of the fields is used here, rather than a (derived) strongly-typed
/// parser.
use crate::dates;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path;

// See above comment block for field documentation.

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub master: String,
    pub workers: Vec<String>,
    pub user: String,
    pub key_path: String,
    pub spark_home: String,
    pub log_folder: Option<String>,
    pub cores_per_node: usize,
    pub hyperthreading: bool,
    pub reference_date: NaiveDate,
}

/// Returns the decoded configuration, or an error message naming the offending field.

pub fn read_cluster_config(filename: &str) -> Result<ClusterConfig> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    let Value::Object(fields) = v else {
        bail!("Expected an object value")
    };
    let reference_date = match grab_string_opt(&fields, "reference_date")? {
        Some(s) => match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => bail!("Field 'reference_date' must be a YYYY-MM-DD date"),
        },
        None => dates::default_reference_date(),
    };
    Ok(ClusterConfig {
        master: grab_string(&fields, "master")?,
        workers: grab_string_array(&fields, "workers")?,
        user: grab_string_opt(&fields, "user")?.unwrap_or_else(|| "ubuntu".to_string()),
        key_path: grab_string(&fields, "key_path")?,
        spark_home: grab_string(&fields, "spark_home")?,
        log_folder: grab_string_opt(&fields, "log_folder")?,
        cores_per_node: grab_usize(&fields, "cores_per_node")?,
        hyperthreading: grab_bool_opt(&fields, "hyperthreading")?.unwrap_or(false),
        reference_date,
    })
}

fn grab_string(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    if let Some(s) = grab_string_opt(fields, name)? {
        Ok(s)
    } else {
        bail!("Field '{name}' must be present and have a string value")
    }
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<String>> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => bail!("Field '{name}' must have a string value"),
        None => Ok(None),
    }
}

fn grab_string_array(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Vec<String>> {
    let Some(Value::Array(elements)) = fields.get(name) else {
        bail!("Field '{name}' must be present and have an array value")
    };
    let mut result = vec![];
    for element in elements {
        if let Value::String(s) = element {
            result.push(s.clone());
        } else {
            bail!("Field '{name}' must hold string values")
        }
    }
    Ok(result)
}

fn grab_usize(fields: &serde_json::Map<String, Value>, name: &str) -> Result<usize> {
    if let Some(Value::Number(n)) = fields.get(name) {
        if let Some(n) = n.as_u64() {
            match usize::try_from(n) {
                Ok(n) => Ok(n),
                Err(_e) => bail!("Field '{name}' must have unsigned integer value"),
            }
        } else {
            bail!("Field '{name}' must have unsigned integer value")
        }
    } else {
        bail!("Field '{name}' must be present and have an integer value")
    }
}

fn grab_bool_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<bool>> {
    match fields.get(name) {
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => bail!("Field '{name}' must have a boolean value"),
        None => Ok(None),
    }
}

// Basic whitebox test that the reading works.

#[test]
fn test_cluster_config() {
    let conf = read_cluster_config("tests/whitebox-config.json").unwrap();
    assert!(&conf.master == "ec2-54-1-2-3.compute.amazonaws.com");
    assert!(conf.workers.len() == 2);
    assert!(&conf.workers[1] == "172.31.1.5");
    assert!(&conf.user == "ubuntu");
    assert!(&conf.key_path == "/home/ubuntu/.ssh/cluster.pem");
    assert!(&conf.spark_home == "/usr/local/spark/");
    assert!(conf.log_folder.as_deref() == Some("/home/ubuntu/logs"));
    assert!(conf.cores_per_node == 8);
    assert!(conf.hyperthreading == true);
    assert!(conf.reference_date == NaiveDate::from_ymd_opt(2016, 3, 14).unwrap());
}

#[test]
fn test_cluster_config_defaults() {
    let conf = read_cluster_config("tests/minimal-config.json").unwrap();
    assert!(&conf.user == "ubuntu");
    assert!(conf.log_folder.is_none());
    assert!(conf.hyperthreading == false);
    assert!(conf.reference_date == dates::default_reference_date());
}

#[test]
fn test_cluster_config_missing() {
    assert!(read_cluster_config("tests/no-such-config.json").is_err());
}
