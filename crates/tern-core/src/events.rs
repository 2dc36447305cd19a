//! Client notifications emitted by the execution queue.
//!
//! Every event is one-way; the queue never waits on the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::queue::{ExecRange, ExprMode};

/// Execution state of a chunk, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecState {
    /// The chunk has begun executing.
    Started,
    /// The chunk finished (cleanly or not).
    Finished,
    /// The chunk was skipped without executing.
    Cancelled,
}

/// Messages sent from the queue to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A chunk's execution state changed.
    ChunkExecStateChanged {
        doc_id: String,
        chunk_id: String,
        exec_state: ExecState,
        /// The chunk's options, forwarded verbatim.
        options: Value,
    },

    /// A source range was sent to the interpreter.
    NotebookRangeExecuted {
        doc_id: String,
        chunk_id: String,
        range: ExecRange,
        expr_mode: ExprMode,
        /// The literal code that was submitted.
        code: String,
    },
}

/// One-way notification sink for client events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClientEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_change_wire_shape() {
        let event = ClientEvent::ChunkExecStateChanged {
            doc_id: "d1".into(),
            chunk_id: "c1".into(),
            exec_state: ExecState::Started,
            options: serde_json::json!({"eval": true}),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "chunk_exec_state_changed");
        assert_eq!(value["exec_state"], "started");
        assert_eq!(value["options"]["eval"], true);
    }

    #[test]
    fn test_range_executed_wire_shape() {
        let event = ClientEvent::NotebookRangeExecuted {
            doc_id: "d1".into(),
            chunk_id: "c1".into(),
            range: ExecRange::new(0, 7),
            expr_mode: ExprMode::New,
            code: "x <- 1\n".into(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "notebook_range_executed");
        assert_eq!(value["range"]["start"], 0);
        assert_eq!(value["range"]["stop"], 7);
        assert_eq!(value["expr_mode"], "new");
    }
}
