//! Wave-synchronous graph executor.
//!
//! A run starts from every node that no connection targets. Each wave
//! executes its whole frontier concurrently and waits for all of it to
//! finish; only then are successors chosen, in frontier order, to form the
//! next wave. The run ends when a wave produces no successors.

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::connection::NodeIndex;
use crate::context::ExecutionContext;
use crate::error::{Result, WorkflowError};
use crate::events::{EventSink, WorkflowEvent};
use crate::graph::Graph;
use crate::nodes::ScopeTransition;

fn default_execution_id() -> String {
    format!("wf-exec-{}", uuid::Uuid::new_v4())
}

/// Options for a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorOptions {
    /// Identifier stamped on every event of the run
    #[serde(default = "default_execution_id")]
    pub execution_id: String,
    /// Abort once this many waves have run (unlimited when `None`)
    #[serde(default)]
    pub max_waves: Option<u32>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            execution_id: default_execution_id(),
            max_waves: None,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub execution_id: String,
    /// Number of waves executed
    pub waves: u32,
    /// Number of node visits, counting revisits
    pub nodes_executed: usize,
}

/// One pending visit: a node plus the loop scopes visible to it,
/// outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Activation {
    node: NodeIndex,
    scopes: Vec<String>,
}

impl Activation {
    fn root(node: NodeIndex) -> Self {
        Self {
            node,
            scopes: Vec::new(),
        }
    }

    fn follow(&self, target: NodeIndex, transition: ScopeTransition) -> Self {
        let mut scopes = self.scopes.clone();
        match transition {
            ScopeTransition::Inherit => {}
            ScopeTransition::Enter(name) => {
                // Loop back edges re-enter a scope that is already open
                if scopes.last() != Some(&name) {
                    scopes.push(name);
                }
            }
            ScopeTransition::Leave(name) => {
                if let Some(pos) = scopes.iter().rposition(|s| *s == name) {
                    scopes.truncate(pos);
                }
            }
        }
        Self {
            node: target,
            scopes,
        }
    }
}

/// Drives a [`Graph`] to completion.
#[derive(Debug, Clone, Default)]
pub struct GraphExecutor {
    options: ExecutorOptions,
}

impl GraphExecutor {
    /// Create an executor with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor from explicit options.
    pub fn with_options(options: ExecutorOptions) -> Self {
        Self { options }
    }

    /// Set the maximum number of waves to execute.
    pub fn with_max_waves(mut self, max_waves: u32) -> Self {
        self.options.max_waves = Some(max_waves);
        self
    }

    /// Set the execution ID.
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.options.execution_id = execution_id.into();
        self
    }

    /// The execution ID stamped on events
    pub fn execution_id(&self) -> &str {
        &self.options.execution_id
    }

    /// Execute `graph` against `ctx`.
    ///
    /// Mutations land in `ctx` as they happen. On failure the error of the
    /// first failing node is returned unchanged and `ctx` holds whatever
    /// state had been written by then.
    pub async fn run(
        &self,
        graph: &Graph,
        ctx: &ExecutionContext,
        event_sink: &dyn EventSink,
    ) -> Result<RunSummary> {
        let frontier: Vec<Activation> = graph
            .start_nodes()
            .into_iter()
            .map(Activation::root)
            .collect();

        log::info!(
            "Starting workflow '{}' ({}) with {} start node(s)",
            graph.name(),
            self.options.execution_id,
            frontier.len()
        );
        self.emit(
            event_sink,
            WorkflowEvent::WorkflowStarted {
                workflow: graph.name().to_string(),
                execution_id: self.options.execution_id.clone(),
                start_nodes: node_names(graph, &frontier),
            },
        );

        match self.run_waves(graph, ctx, frontier, event_sink).await {
            Ok(summary) => {
                log::info!(
                    "Workflow '{}' completed: {} waves, {} node visits",
                    graph.name(),
                    summary.waves,
                    summary.nodes_executed
                );
                self.emit(
                    event_sink,
                    WorkflowEvent::WorkflowCompleted {
                        workflow: graph.name().to_string(),
                        execution_id: self.options.execution_id.clone(),
                        waves: summary.waves,
                        nodes_executed: summary.nodes_executed,
                    },
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!("Workflow '{}' failed: {}", graph.name(), e);
                self.emit(
                    event_sink,
                    WorkflowEvent::WorkflowFailed {
                        workflow: graph.name().to_string(),
                        execution_id: self.options.execution_id.clone(),
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn run_waves(
        &self,
        graph: &Graph,
        ctx: &ExecutionContext,
        mut frontier: Vec<Activation>,
        event_sink: &dyn EventSink,
    ) -> Result<RunSummary> {
        let mut waves: u32 = 0;
        let mut nodes_executed: usize = 0;

        while !frontier.is_empty() {
            if let Some(limit) = self.options.max_waves {
                if waves >= limit {
                    log::warn!("Workflow '{}' hit the wave limit ({})", graph.name(), limit);
                    return Err(WorkflowError::WaveLimitExceeded(limit));
                }
            }
            waves += 1;

            let names = node_names(graph, &frontier);
            log::debug!("Wave {}: {:?}", waves, names);
            self.emit(
                event_sink,
                WorkflowEvent::WaveStarted {
                    execution_id: self.options.execution_id.clone(),
                    wave: waves,
                    nodes: names,
                },
            );

            // Barrier: every visit of this wave finishes before any successor is chosen
            try_join_all(
                frontier
                    .iter()
                    .map(|activation| self.visit(graph, ctx, activation, waves, event_sink)),
            )
            .await?;
            nodes_executed += frontier.len();

            frontier = next_frontier(graph, ctx, &frontier)?;
        }

        Ok(RunSummary {
            execution_id: self.options.execution_id.clone(),
            waves,
            nodes_executed,
        })
    }

    async fn visit(
        &self,
        graph: &Graph,
        ctx: &ExecutionContext,
        activation: &Activation,
        wave: u32,
        event_sink: &dyn EventSink,
    ) -> Result<()> {
        let node = graph
            .node(activation.node)
            .ok_or_else(|| WorkflowError::UnknownNode(format!("#{}", activation.node)))?;

        self.emit(
            event_sink,
            WorkflowEvent::NodeStarted {
                execution_id: self.options.execution_id.clone(),
                wave,
                node: node.name.clone(),
            },
        );

        if let Err(e) = node.execute(ctx.scoped(&activation.scopes)).await {
            log::error!("Node '{}' failed in wave {}: {}", node.name, wave, e);
            self.emit(
                event_sink,
                WorkflowEvent::NodeFailed {
                    execution_id: self.options.execution_id.clone(),
                    wave,
                    node: node.name.clone(),
                    error: e.to_string(),
                },
            );
            return Err(e);
        }

        self.emit(
            event_sink,
            WorkflowEvent::NodeCompleted {
                execution_id: self.options.execution_id.clone(),
                wave,
                node: node.name.clone(),
            },
        );
        Ok(())
    }

    fn emit(&self, event_sink: &dyn EventSink, event: WorkflowEvent) {
        if let Err(e) = event_sink.send(event) {
            log::warn!("Execution {}: {}", self.options.execution_id, e);
        }
    }
}

/// Successors of a completed wave, concatenated in frontier order.
fn next_frontier(
    graph: &Graph,
    ctx: &ExecutionContext,
    frontier: &[Activation],
) -> Result<Vec<Activation>> {
    let mut next = Vec::new();
    for activation in frontier {
        let node = graph
            .node(activation.node)
            .ok_or_else(|| WorkflowError::UnknownNode(format!("#{}", activation.node)))?;

        for target in node.determine_next(ctx.scoped(&activation.scopes))? {
            next.push(activation.follow(target, node.scope_transition(target)));
        }
    }
    Ok(next)
}

fn node_names(graph: &Graph, frontier: &[Activation]) -> Vec<String> {
    frontier
        .iter()
        .filter_map(|a| graph.node(a.node))
        .map(|n| n.name.clone())
        .collect()
}
