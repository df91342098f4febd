use super::query::{
    ParentLink, create_edges_query, create_processes_query, create_snapshot_query,
};
use super::{GraphTransport, Snapshot};
use crate::prelude::*;
use crate::process::ProcessRecord;
use itertools::Itertools;

pub const DEFAULT_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub graph: String,
    pub user: String,
    /// Authentication is skipped when empty
    pub password: String,
    /// Delete the graph before loading
    pub clear: bool,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub process_count: usize,
    pub graph_name: String,
    pub snapshot_id: String,
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Loaded {} processes into graph '{}' (snapshot {}).",
            self.process_count, self.graph_name, self.snapshot_id
        )
    }
}

fn command(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

async fn graph_query<T: GraphTransport + ?Sized>(
    transport: &mut T,
    graph: &str,
    query: String,
) -> Result<()> {
    trace!("GRAPH.QUERY {graph} {query}");
    transport
        .execute(&["GRAPH.QUERY".to_string(), graph.to_string(), query])
        .await?;
    Ok(())
}

/// Write `processes` to the graph as one snapshot.
///
/// Requests are sent one at a time, every node batch before the first edge batch since
/// edges are matched against already committed nodes. The first failure aborts the
/// load; batches committed before it stay in the graph.
pub async fn load_snapshot<T: GraphTransport + ?Sized>(
    transport: &mut T,
    processes: &[ProcessRecord],
    snapshot: &Snapshot,
    options: &LoadOptions,
) -> Result<LoadSummary> {
    ensure!(options.batch_size > 0, "Batch size must be at least 1");
    let graph = options.graph.as_str();

    if !options.password.is_empty() {
        debug!("Authenticating");
        let auth = if options.user.is_empty() {
            command(&["AUTH", options.password.as_str()])
        } else {
            command(&["AUTH", options.user.as_str(), options.password.as_str()])
        };
        transport.execute(&auth).await?;
    }

    if options.clear {
        info!("Deleting graph '{graph}'");
        transport.execute(&command(&["GRAPH.DELETE", graph])).await?;
    }

    debug!("Creating snapshot node {}", snapshot.id);
    graph_query(transport, graph, create_snapshot_query(snapshot)).await?;

    let node_batches = processes.chunks(options.batch_size).collect_vec();
    for (index, batch) in node_batches.iter().enumerate() {
        debug!(
            "Creating process nodes, batch {}/{} ({} processes)",
            index + 1,
            node_batches.len(),
            batch.len()
        );
        graph_query(transport, graph, create_processes_query(batch, snapshot)).await?;
    }

    let links = processes.iter().filter_map(ParentLink::of).collect_vec();
    let edge_batches = links.chunks(options.batch_size).collect_vec();
    for (index, batch) in edge_batches.iter().enumerate() {
        debug!(
            "Creating parent edges, batch {}/{} ({} edges)",
            index + 1,
            edge_batches.len(),
            batch.len()
        );
        graph_query(transport, graph, create_edges_query(batch, &snapshot.id)).await?;
    }

    Ok(LoadSummary {
        process_count: processes.len(),
        graph_name: options.graph.clone(),
        snapshot_id: snapshot.id.clone(),
    })
}
