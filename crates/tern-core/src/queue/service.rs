//! Queue lifecycle owner and inbound host surface.
//!
//! The global queue exists only while there is work: it is created on the
//! first execute-chunks request, kept while any document queue holds units,
//! and disposed once fully drained or on user interrupt. The hosting
//! session owns one [`QueueService`] and routes interpreter readiness
//! callbacks and client requests through it.

use crate::error::Result;
use crate::host::{Host, QueueConfig};

use super::doc::{DocQueue, DocQueueSnapshot, QueueOp};
use super::scheduler::NotebookQueue;
use super::unit::{ExecUnit, ExprMode};

/// Session-owned entry point to the execution queue.
pub struct QueueService {
    config: QueueConfig,
    host: Host,
    queue: Option<NotebookQueue>,
}

impl QueueService {
    pub fn new(config: QueueConfig, host: Host) -> Self {
        Self {
            config,
            host,
            queue: None,
        }
    }

    /// Whether a queue currently exists.
    pub fn is_active(&self) -> bool {
        self.queue.is_some()
    }

    /// Queue a document's chunks for execution and start processing
    /// immediately, creating the global queue if it does not exist.
    pub fn execute_chunks(&mut self, doc: DocQueue) -> Result<()> {
        if self.queue.is_none() {
            self.queue = Some(NotebookQueue::new(self.config.clone(), self.host.clone())?);
        }
        if let Some(queue) = self.queue.as_mut() {
            queue.add(doc);
            queue.advance(ExprMode::New);
        }
        Ok(())
    }

    /// Apply a live-edit mutation to a queued unit. A no-op when no queue
    /// exists.
    pub fn update_unit(&mut self, unit: ExecUnit, op: QueueOp, before: Option<&str>) {
        if let Some(queue) = self.queue.as_mut() {
            queue.update(unit, op, before);
        }
    }

    /// Interpreter readiness signal: a prompt was shown.
    ///
    /// Advances in continuation mode when the prompt text matches the
    /// configured continuation prompt, then disposes the queue if it has
    /// fully drained.
    pub fn on_console_prompt(&mut self, prompt: &str) {
        let mode = if prompt == self.config.continuation_prompt {
            ExprMode::Continuation
        } else {
            ExprMode::New
        };

        if let Some(queue) = self.queue.as_mut() {
            queue.advance(mode);
        }

        if self.queue.as_ref().is_some_and(NotebookQueue::complete) {
            self.queue = None;
        }
    }

    /// User-initiated interrupt: discard everything. Idempotent.
    pub fn on_user_interrupt(&mut self) {
        if let Some(queue) = self.queue.as_mut() {
            queue.clear();
        }
        self.queue = None;
    }

    /// Completion signal from the alternate-engine subsystem.
    pub fn on_chunk_exec_completed(&mut self, doc_id: &str, chunk_id: &str, ctx_id: &str) {
        if let Some(queue) = self.queue.as_mut() {
            queue.on_chunk_exec_completed(doc_id, chunk_id, ctx_id);
        }
    }

    /// Snapshot a document's queued work, if any.
    pub fn doc_queue(&self, doc_id: &str) -> Option<DocQueueSnapshot> {
        self.queue.as_ref().and_then(|queue| queue.doc_queue(doc_id))
    }
}
