use super::Snapshot;
use super::cypher::{CypherValue, map_literal};
use crate::process::ProcessRecord;
use itertools::Itertools;

/// A parent/child pair, as submitted to the edge batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub pid: i64,
    pub ppid: i64,
}

impl ParentLink {
    /// Processes without a pid or a positive parent pid have no edge to create.
    pub fn of(process: &ProcessRecord) -> Option<Self> {
        Some(Self {
            pid: process.pid?,
            ppid: process.parent_pid()?,
        })
    }
}

pub fn create_snapshot_query(snapshot: &Snapshot) -> String {
    [
        "CREATE (:Snapshot {".to_string(),
        format!("id: {},", CypherValue::from(snapshot.id.as_str())),
        format!("timestamp: {},", CypherValue::from(snapshot.timestamp.as_str())),
        format!("host: {},", CypherValue::from(snapshot.host.as_str())),
        format!("os: {}", CypherValue::from(snapshot.os.as_str())),
        "});".to_string(),
    ]
    .join(" ")
}

fn process_row(process: &ProcessRecord, snapshot: &Snapshot) -> String {
    map_literal(&[
        ("pid", process.pid.into()),
        ("ppid", process.ppid.into()),
        ("user", process.user.as_str().into()),
        ("uid", process.uid.into()),
        ("gid", process.gid.into()),
        ("stat", process.stat.as_str().into()),
        ("cpu", process.cpu.into()),
        ("mem", process.mem.into()),
        ("rss", process.rss.into()),
        ("vsz", process.vsz.into()),
        ("start_time", process.start_time.as_deref().into()),
        ("start_time_raw", process.start_time_raw.as_deref().into()),
        ("command", process.command.as_str().into()),
        ("snapshot_id", snapshot.id.as_str().into()),
        ("host", snapshot.host.as_str().into()),
    ])
}

/// One `Process` node per record, with the record's fields plus `snapshot_id` and `host`.
pub fn create_processes_query(batch: &[ProcessRecord], snapshot: &Snapshot) -> String {
    let rows = batch
        .iter()
        .map(|process| process_row(process, snapshot))
        .join(", ");
    format!("UNWIND [ {rows} ] AS row CREATE (p:Process) SET p = row;")
}

/// `PARENT_OF` edges between nodes of the same snapshot. `MERGE` makes resubmission harmless.
pub fn create_edges_query(batch: &[ParentLink], snapshot_id: &str) -> String {
    let rows = batch
        .iter()
        .map(|link| {
            map_literal(&[
                ("pid", link.pid.into()),
                ("ppid", link.ppid.into()),
                ("snapshot_id", snapshot_id.into()),
            ])
        })
        .join(", ");
    [
        format!("UNWIND [ {rows} ] AS row"),
        "MATCH (p:Process {pid: row.pid, snapshot_id: row.snapshot_id})".to_string(),
        "MATCH (parent:Process {pid: row.ppid, snapshot_id: row.snapshot_id})".to_string(),
        "MERGE (parent)-[:PARENT_OF {snapshot_id: row.snapshot_id}]->(p);".to_string(),
    ]
    .join(" ")
}
