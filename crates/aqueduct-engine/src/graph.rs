//! Stage graph planning: turns a pipeline config into a topologically
//! ordered execution plan, rejecting malformed topologies.

use std::collections::BTreeMap;
use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::config::types::{PipelineConfig, StageConfig};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate stage name '{0}'")]
    DuplicateStage(String),

    #[error("Connection references unknown stage '{0}'")]
    UnknownEndpoint(String),

    #[error("Pipeline graph contains a cycle through stage '{0}'")]
    Cycle(String),

    #[error("Source stage '{0}' cannot have an incoming connection")]
    SourceHasInput(String),

    #[error("Sink stage '{0}' cannot have an outgoing connection")]
    SinkHasOutput(String),

    #[error("Duplicate connection '{from}' -> '{to}'")]
    DuplicateEdge { from: String, to: String },

    #[error("Stage '{0}' is not reachable from any source")]
    Unreachable(String),

    #[error("Stage '{0}' has no path to any sink")]
    DeadEnd(String),
}

/// What a stage does in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    Source,
    Transform,
    Sink,
}

impl StageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Transform => "transform",
            Self::Sink => "sink",
        }
    }
}

/// One stage of a planned pipeline, with resolved inputs.
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub name: String,
    pub role: StageRole,
    pub plugin: String,
    pub properties: BTreeMap<String, String>,
    /// Names of upstream stages, in connection declaration order.
    pub inputs: Vec<String>,
}

/// A validated pipeline plan. Stages are in topological order, so a single
/// forward pass visits every stage after all of its inputs.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub stages: Vec<PlannedStage>,
}

impl ExecutionPlan {
    pub fn stage(&self, name: &str) -> Option<&PlannedStage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Build the execution plan for a pipeline config.
///
/// # Errors
///
/// Returns a [`GraphError`] if stage names collide, a connection references
/// an unknown stage, a source has an input or a sink an output, the graph
/// has a cycle, or any stage is disconnected from the source-to-sink flow.
pub fn plan(config: &PipelineConfig) -> Result<ExecutionPlan, GraphError> {
    let mut graph: DiGraph<&StageConfig, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, (NodeIndex, StageRole)> = HashMap::new();

    let roles = config
        .sources
        .iter()
        .map(|s| (s, StageRole::Source))
        .chain(config.transforms.iter().map(|s| (s, StageRole::Transform)))
        .chain(config.sinks.iter().map(|s| (s, StageRole::Sink)));

    for (stage, role) in roles {
        let idx = graph.add_node(stage);
        if nodes.insert(stage.name.as_str(), (idx, role)).is_some() {
            return Err(GraphError::DuplicateStage(stage.name.clone()));
        }
    }

    for conn in config.effective_connections() {
        let (from_idx, from_role) = *nodes
            .get(conn.from.as_str())
            .ok_or_else(|| GraphError::UnknownEndpoint(conn.from.clone()))?;
        let (to_idx, to_role) = *nodes
            .get(conn.to.as_str())
            .ok_or_else(|| GraphError::UnknownEndpoint(conn.to.clone()))?;

        if to_role == StageRole::Source {
            return Err(GraphError::SourceHasInput(conn.to));
        }
        if from_role == StageRole::Sink {
            return Err(GraphError::SinkHasOutput(conn.from));
        }
        // A parallel edge would deliver every record once per copy.
        if graph.find_edge(from_idx, to_idx).is_some() {
            return Err(GraphError::DuplicateEdge {
                from: conn.from,
                to: conn.to,
            });
        }
        graph.add_edge(from_idx, to_idx, ());
    }

    let order = toposort(&graph, None)
        .map_err(|cycle| GraphError::Cycle(graph[cycle.node_id()].name.clone()))?;

    // Every stage must sit on a source-to-sink path.
    let source_indices: Vec<NodeIndex> = nodes
        .values()
        .filter(|(_, role)| *role == StageRole::Source)
        .map(|(idx, _)| *idx)
        .collect();
    let sink_indices: Vec<NodeIndex> = nodes
        .values()
        .filter(|(_, role)| *role == StageRole::Sink)
        .map(|(idx, _)| *idx)
        .collect();

    let from_sources = reach_set(&graph, &source_indices, false);
    let to_sinks = reach_set(&graph, &sink_indices, true);

    for &idx in &order {
        let name = &graph[idx].name;
        let (_, role) = nodes[name.as_str()];
        if role != StageRole::Source && !from_sources[idx.index()] {
            return Err(GraphError::Unreachable(name.clone()));
        }
        if role != StageRole::Sink && !to_sinks[idx.index()] {
            return Err(GraphError::DeadEnd(name.clone()));
        }
    }

    let stages = order
        .into_iter()
        .map(|idx| {
            let stage = graph[idx];
            let (_, role) = nodes[stage.name.as_str()];
            let mut inputs: Vec<String> = graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|up| graph[up].name.clone())
                .collect();
            // Petgraph yields neighbors newest-edge-first; restore
            // declaration order.
            inputs.reverse();
            PlannedStage {
                name: stage.name.clone(),
                role,
                plugin: stage.plugin.clone(),
                properties: stage.properties.clone(),
                inputs,
            }
        })
        .collect();

    Ok(ExecutionPlan { stages })
}

/// Mark every node reachable from `starts`, following edges forward or
/// (when `reversed`) backward.
fn reach_set(graph: &DiGraph<&StageConfig, ()>, starts: &[NodeIndex], reversed: bool) -> Vec<bool> {
    let mut seen = vec![false; graph.node_count()];
    let mut stack: Vec<NodeIndex> = starts.to_vec();
    for &s in starts {
        seen[s.index()] = true;
    }
    let dir = if reversed {
        Direction::Incoming
    } else {
        Direction::Outgoing
    };
    while let Some(node) = stack.pop() {
        for next in graph.neighbors_directed(node, dir) {
            if !seen[next.index()] {
                seen[next.index()] = true;
                stack.push(next);
            }
        }
    }
    seen
}
