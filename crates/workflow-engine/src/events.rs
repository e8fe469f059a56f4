//! Event types for observing workflow runs
//!
//! The executor reports run, wave and node progress to an [`EventSink`].
//! Hosts decide where events go; the CLI forwards them to the log.

use serde::{Deserialize, Serialize};

/// Receives progress events from a run
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    ///
    /// A delivery failure is logged by the executor and the run continues.
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Why a sink could not take an event
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The event could not be encoded for the sink's output
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// The sink no longer accepts events
    #[error("Event sink rejected event: {0}")]
    Rejected(String),
}

/// Events emitted during workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// Run started
    #[serde(rename_all = "camelCase")]
    WorkflowStarted {
        workflow: String,
        execution_id: String,
        start_nodes: Vec<String>,
    },

    /// A wave is about to execute
    #[serde(rename_all = "camelCase")]
    WaveStarted {
        execution_id: String,
        wave: u32,
        nodes: Vec<String>,
    },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        execution_id: String,
        wave: u32,
        node: String,
    },

    /// A node finished executing
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: String,
        wave: u32,
        node: String,
    },

    /// A node failed; the run aborts
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        execution_id: String,
        wave: u32,
        node: String,
        error: String,
    },

    /// Run reached an empty frontier
    #[serde(rename_all = "camelCase")]
    WorkflowCompleted {
        workflow: String,
        execution_id: String,
        waves: u32,
        nodes_executed: usize,
    },

    /// Run aborted
    #[serde(rename_all = "camelCase")]
    WorkflowFailed {
        workflow: String,
        execution_id: String,
        error: String,
    },
}

impl WorkflowEvent {
    /// Name of the node this event concerns, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node, .. }
            | Self::NodeCompleted { node, .. }
            | Self::NodeFailed { node, .. } => Some(node),
            _ => None,
        }
    }
}

/// Drops every event; used by [`Graph::execute`](crate::Graph::execute)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Records events in arrival order
#[derive(Debug, Default)]
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Remove and return the recorded events
    pub fn take(&self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Names of the nodes that started, in order
    pub fn started_nodes(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::NodeStarted { node, .. } => Some(node.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn started(node: &str) -> WorkflowEvent {
        WorkflowEvent::NodeStarted {
            execution_id: "exec1".to_string(),
            wave: 1,
            node: node.to_string(),
        }
    }

    #[test]
    fn test_vec_event_sink_records_in_order() {
        let sink = VecEventSink::new();
        sink.send(started("assign")).unwrap();
        sink.send(started("check")).unwrap();

        assert_eq!(sink.events()[0].node(), Some("assign"));
        assert_eq!(sink.started_nodes(), vec!["assign", "check"]);

        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_null_event_sink_accepts_everything() {
        assert!(NullEventSink.send(started("assign")).is_ok());
    }

    #[test]
    fn test_event_error_messages() {
        let encode = serde_json::from_str::<Value>("{").unwrap_err();
        assert!(EventError::from(encode)
            .to_string()
            .starts_with("Failed to encode event"));
        assert_eq!(
            EventError::Rejected("closed".to_string()).to_string(),
            "Event sink rejected event: closed"
        );
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WorkflowEvent::WaveStarted {
            execution_id: "exec1".to_string(),
            wave: 2,
            nodes: vec!["a".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "waveStarted");
        assert_eq!(json["executionId"], "exec1");
    }
}
