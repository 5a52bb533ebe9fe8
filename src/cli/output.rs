//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cli::args::{OutputFormat, QuiverArgs};
use crate::error::Result;
use crate::pool::PoolStatsSnapshot;

/// Result of a build.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildReport {
    pub documents: usize,
    pub partitions: usize,
    pub partitions_written: usize,
    pub segments: usize,
    pub duration_ms: u64,
    pub docs_per_second: f64,
    pub pool: PoolStatsSnapshot,
}

/// One partition as found on disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionReport {
    pub partition: String,
    pub segments: usize,
    pub bytes: u64,
    pub documents: Option<u64>,
    /// A lock file is present: a writer is open or a job died holding it.
    pub locked: bool,
}

/// Result of an inspection.
#[derive(Debug, Serialize, Deserialize)]
pub struct InspectReport {
    pub partitions: Vec<PartitionReport>,
}

/// Output a result in the requested format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &QuiverArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &QuiverArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    match value.get("partitions").and_then(Value::as_array) {
        Some(partitions) if value.as_object().is_some_and(|obj| obj.len() == 1) => {
            output_partitions_human(partitions)
        }
        _ => output_generic_human(&value, 0),
    }
    Ok(())
}

fn output_partitions_human(partitions: &[Value]) {
    if partitions.is_empty() {
        println!("No partitions found.");
        return;
    }

    println!(
        "{:<24} {:>8} {:>12} {:>10}  {}",
        "PARTITION", "SEGMENTS", "BYTES", "DOCS", "LOCKED"
    );
    for partition in partitions {
        let documents = match partition.get("documents") {
            Some(Value::Number(n)) => n.to_string(),
            _ => "-".to_string(),
        };
        println!(
            "{:<24} {:>8} {:>12} {:>10}  {}",
            format_value(&partition["partition"]),
            format_value(&partition["segments"]),
            format_value(&partition["bytes"]),
            documents,
            if partition["locked"].as_bool() == Some(true) {
                "yes"
            } else {
                ""
            }
        );
    }
}

fn output_generic_human(value: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(obj) => {
            for (key, val) in obj {
                if val.is_object() {
                    println!("{pad}{key}:");
                    output_generic_human(val, indent + 1);
                } else {
                    println!("{pad}{key}: {}", format_value(val));
                }
            }
        }
        _ => println!("{pad}{}", format_value(value)),
    }
}

fn output_json<T: Serialize>(result: &T, args: &QuiverArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Render a JSON value without quotes around strings and with short floats.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.2}"),
            _ => n.to_string(),
        },
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
