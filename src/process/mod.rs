use crate::prelude::*;
use chrono::{NaiveDateTime, SecondsFormat, TimeZone, Utc};
use itertools::Itertools;
use std::process::Command;

/// Columns requested from `ps`, in the order they are parsed.
const PS_FORMAT: &str = "pid=,ppid=,user=,uid=,gid=,stat=,%cpu=,%mem=,rss=,vsz=,lstart=,command=";

/// Number of whitespace-separated fields before the start time.
const FIXED_FIELDS: usize = 10;
/// `lstart` always prints as five tokens, e.g. `Mon Oct 14 10:22:33 2024`.
const START_TIME_TOKENS: usize = 5;
const LSTART_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// One row of the process table. Numeric fields that `ps` printed in an unexpected
/// form are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub pid: Option<i64>,
    pub ppid: Option<i64>,
    pub user: String,
    pub uid: Option<i64>,
    pub gid: Option<i64>,
    pub stat: String,
    pub cpu: Option<f64>,
    pub mem: Option<f64>,
    /// Resident set size, in KiB
    pub rss: Option<i64>,
    /// Virtual size, in KiB
    pub vsz: Option<i64>,
    /// Start time as UTC ISO-8601, when `start_time_raw` could be parsed
    pub start_time: Option<String>,
    pub start_time_raw: Option<String>,
    pub command: String,
}

impl ProcessRecord {
    /// The parent pid, if this process has a parent that can appear in the table.
    pub fn parent_pid(&self) -> Option<i64> {
        self.ppid.filter(|ppid| *ppid > 0)
    }
}

/// Capture the current process table, in the order `ps` lists it.
pub fn list_processes() -> Result<Vec<ProcessRecord>> {
    debug!("Running ps -axo {PS_FORMAT}");
    let output = Command::new("ps")
        .args(["-axo", PS_FORMAT])
        .output()
        .context("Failed to run ps")?;
    if !output.status.success() {
        bail!(
            "ps exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let processes = parse_ps_output(&stdout, &chrono::Local);
    debug!("Collected {} processes", processes.len());
    Ok(processes)
}

/// Parse the output of [`PS_FORMAT`], interpreting start times in `tz`.
pub fn parse_ps_output<Tz: TimeZone>(output: &str, tz: &Tz) -> Vec<ProcessRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let record = parse_ps_line(line, tz);
            if record.is_none() {
                warn!("Skipping unexpected ps line: {line}");
            }
            record
        })
        .collect()
}

fn parse_ps_line<Tz: TimeZone>(line: &str, tz: &Tz) -> Option<ProcessRecord> {
    let fields = line.split_whitespace().collect_vec();
    if fields.len() < FIXED_FIELDS {
        return None;
    }

    let (fixed, rest) = fields.split_at(FIXED_FIELDS);
    let (start_tokens, command_tokens) = rest.split_at(rest.len().min(START_TIME_TOKENS));
    let start_time_raw = start_tokens.join(" ");

    Some(ProcessRecord {
        pid: fixed[0].parse().ok(),
        ppid: fixed[1].parse().ok(),
        user: fixed[2].to_string(),
        uid: fixed[3].parse().ok(),
        gid: fixed[4].parse().ok(),
        stat: fixed[5].to_string(),
        cpu: fixed[6].parse().ok(),
        mem: fixed[7].parse().ok(),
        rss: fixed[8].parse().ok(),
        vsz: fixed[9].parse().ok(),
        start_time: parse_start_time(&start_time_raw, tz),
        start_time_raw: (!start_time_raw.is_empty()).then_some(start_time_raw),
        command: command_tokens.join(" "),
    })
}

/// Convert an `lstart` value, read as a wall-clock time in `tz`, to UTC ISO-8601
/// with millisecond precision.
pub fn parse_start_time<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<String> {
    let naive = NaiveDateTime::parse_from_str(raw, LSTART_FORMAT).ok()?;
    let local = tz.from_local_datetime(&naive).earliest()?;
    Some(
        local
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}
