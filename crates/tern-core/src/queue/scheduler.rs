//! The global execution queue and its scheduling state machine.
//!
//! One scheduler instance serializes all chunk execution across every
//! queued document: the interpreter evaluates one statement at a time and
//! has no notion of per-chunk isolation, so at most one unit is ever
//! executing. All state transitions happen on the single thread that drives
//! the interpreter's readiness callbacks and must never block; the only
//! other thread is the [`ConsoleSubmitter`] delivery worker.

use std::collections::VecDeque;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::events::{ClientEvent, ExecState};
use crate::host::{AltChunk, Host, QueueConfig};

use super::context::ChunkContext;
use super::doc::{CommitMode, DocQueue, DocQueueSnapshot, QueueOp};
use super::submit::{ConsoleSubmitter, console_input_request};
use super::unit::{ChunkOptions, ExecMode, ExecScope, ExecUnit, ExprMode, UnitKey};

/// The global queue of notebook work.
///
/// Owns the ordered document queues, the identity of the single currently
/// executing unit, and that unit's execution context when it runs on the
/// primary interpreter. Document queues own their units; `current` is only
/// a lookup key, never a second owner.
pub struct NotebookQueue {
    config: QueueConfig,
    host: Host,
    submitter: ConsoleSubmitter,
    /// Document queues in arrival order. Execution always targets the head.
    docs: VecDeque<DocQueue>,
    /// Identity of the unit currently executing, if any.
    current: Option<UnitKey>,
    /// Execution context for the current unit when its engine is the
    /// primary interpreter; absent for alternate-engine units.
    context: Option<ChunkContext>,
}

impl NotebookQueue {
    /// Create a queue and launch its console delivery worker.
    pub fn new(config: QueueConfig, host: Host) -> Result<Self> {
        let submitter = ConsoleSubmitter::spawn(host.injector.clone())?;
        Ok(Self {
            config,
            host,
            submitter,
            docs: VecDeque::new(),
            current: None,
            context: None,
        })
    }

    /// The queue is complete once every document queue has drained.
    pub fn complete(&self) -> bool {
        self.docs.is_empty()
    }

    /// Append a document queue.
    pub fn add(&mut self, queue: DocQueue) {
        self.docs.push_back(queue);
    }

    /// Route a live-edit mutation to the unit's document queue.
    pub fn update(&mut self, unit: ExecUnit, op: QueueOp, before: Option<&str>) {
        if let Some(doc) = self
            .docs
            .iter_mut()
            .find(|doc| doc.doc_id() == unit.doc_id)
        {
            doc.update(unit, op, before);
        }
    }

    /// Snapshot a document's queue contents, if it is queued.
    pub fn doc_queue(&self, doc_id: &str) -> Option<DocQueueSnapshot> {
        self.docs
            .iter()
            .find(|doc| doc.doc_id() == doc_id)
            .map(DocQueue::snapshot)
    }

    /// Advance the state machine in response to a readiness signal.
    ///
    /// `mode` reflects the kind of prompt the interpreter showed: a fresh
    /// top-level prompt or a continuation-of-expression prompt.
    pub fn advance(&mut self, mode: ExprMode) {
        // Nothing queued
        if self.docs.is_empty() {
            return;
        }

        // Defer while the interpreter is mid-evaluation; the next readiness
        // signal retries
        if self.host.interpreter.is_evaluating() {
            return;
        }

        if let Some(key) = self.current.clone() {
            // An evaluation error stops everything unless the chunk opted
            // into continuing with error = true
            let fatal_error = self
                .context
                .as_ref()
                .is_some_and(|context| context.has_errors() && !context.options().error);
            if fatal_error {
                self.clear();
                return;
            }

            // A unit deleted out from under us by a live edit reads as
            // complete and is finished off cleanly
            let complete = self.current_unit().is_none_or(ExecUnit::complete);
            if !complete {
                self.execute_current(mode);
                return;
            }

            // Still at a continuation prompt at the end of a chunk: the
            // chunk's source ran out while the interpreter expected more
            let mut incomplete = false;
            if mode == ExprMode::Continuation && self.current_scope() == Some(ExecScope::Chunk) {
                incomplete = true;
                self.send_incomplete_error(&key);
            }

            self.pop_unit(&key);

            let options = self
                .context
                .as_ref()
                .map(|context| context.raw_options().clone())
                .unwrap_or_else(empty_options);
            self.emit_state(&key, ExecState::Finished, options);

            if let Some(mut context) = self.context.take() {
                context.disconnect();
            }
            self.current = None;

            // The injected interrupt must reach a top-level prompt before
            // any further code is dispatched
            if incomplete {
                return;
            }
        }

        self.execute_next(mode);
    }

    /// Completion signal from the alternate-engine subsystem.
    ///
    /// Only honored when it names the currently executing unit and that
    /// unit has no interpreter context (so it was dispatched to an
    /// alternate engine); anything else is stale and ignored.
    pub fn on_chunk_exec_completed(&mut self, doc_id: &str, chunk_id: &str, _ctx_id: &str) {
        let Some(key) = self.current.clone() else {
            return;
        };

        if key.doc_id == doc_id && key.chunk_id == chunk_id && self.context.is_none() {
            self.pop_unit(&key);
            self.emit_state(&key, ExecState::Finished, empty_options());
            self.current = None;
            self.advance(ExprMode::New);
        }
    }

    /// Discard all queued and in-flight state unconditionally.
    ///
    /// No notifications are sent for units still queued; in-flight console
    /// submissions are not retracted.
    pub fn clear(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.disconnect();
        }
        self.current = None;
        self.docs.clear();
    }

    /// Execute the next line or expression of the current unit.
    fn execute_current(&mut self, mode: ExprMode) {
        let Some(key) = self.current.clone() else {
            return;
        };

        // Between top-level expressions of the same chunk, let output
        // collaborators commit the previous expression's output
        if mode == ExprMode::New
            && let Some(context) = self.context.as_mut()
        {
            context.expr_complete();
        }

        let Some(unit) = self.current_unit_mut() else {
            return;
        };
        let Some((range, code)) = unit.pop_exec_range(mode) else {
            return;
        };

        self.send_console_input(&key.chunk_id, Some(&code));

        // Let the client know the range has been sent to the interpreter
        self.host.events.emit(ClientEvent::NotebookRangeExecuted {
            doc_id: key.doc_id,
            chunk_id: key.chunk_id,
            range,
            expr_mode: mode,
            code,
        });
    }

    /// Dispatch the first unit of the head document queue.
    fn execute_next(&mut self, _mode: ExprMode) {
        let Some((key, scope, exec_mode, raw_options, commit_mode, pixel_width, char_width, inner)) =
            self.docs.front().and_then(|doc| {
                let unit = doc.first_unit()?;
                Some((
                    unit.key(),
                    unit.scope,
                    unit.mode,
                    unit.options.clone(),
                    doc.commit_mode(),
                    doc.pixel_width(),
                    doc.char_width(),
                    unit.inner_code(),
                ))
            })
        else {
            return;
        };

        // Undeclared options notify as an empty object
        let raw_options = match raw_options {
            Value::Null => empty_options(),
            other => other,
        };

        // A unit whose metadata cannot be read must never stall the queue
        let options = match ChunkOptions::parse(&raw_options, &self.config.primary_engine) {
            Ok(options) => options,
            Err(e) => {
                tracing::error!("skipping chunk {} with bad options: {}", key.chunk_id, e);
                self.skip_unit();
                return;
            }
        };

        // Batch units carry an eval policy decided before submission;
        // eval = false means silent advancement with a cancellation
        if exec_mode == ExecMode::Batch && !options.eval {
            self.skip_unit();
            return;
        }

        let ctx_id = match commit_mode {
            CommitMode::Saved => self.config.saved_ctx_id.clone(),
            CommitMode::Unsaved => self.config.unsaved_ctx_id.clone(),
        };

        if options.engine == self.config.primary_engine {
            let mut context = ChunkContext::new(
                key.doc_id.clone(),
                key.chunk_id.clone(),
                ctx_id,
                scope,
                options,
                raw_options.clone(),
                pixel_width,
                char_width,
            );
            context.connect(self.host.console.as_ref());
            self.context = Some(context);
            self.current = Some(key.clone());
            self.emit_state(&key, ExecState::Started, raw_options);

            // A newly dispatched unit always executes its first range in
            // the same tick it starts
            self.execute_current(ExprMode::New);
        } else {
            let code = match inner {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("skipping chunk {}: {}", key.chunk_id, e);
                    self.skip_unit();
                    return;
                }
            };

            self.current = Some(key.clone());
            self.emit_state(&key, ExecState::Started, raw_options.clone());

            let request = AltChunk {
                doc_id: key.doc_id.clone(),
                chunk_id: key.chunk_id.clone(),
                ctx_id,
                engine: options.engine,
                code,
                options: raw_options,
            };
            if let Err(e) = self.host.engines.execute_chunk(request) {
                tracing::error!("alternate engine rejected chunk {}: {}", key.chunk_id, e);
                self.current = None;
                self.skip_unit();
            }
            // Completion arrives later via on_chunk_exec_completed
        }
    }

    /// Remove the head unit without executing it, notify the client, and
    /// try the next one.
    fn skip_unit(&mut self) {
        let Some(key) = self
            .docs
            .front()
            .and_then(DocQueue::first_unit)
            .map(ExecUnit::key)
        else {
            return;
        };

        self.pop_unit(&key);
        self.emit_state(&key, ExecState::Cancelled, empty_options());
        self.execute_next(ExprMode::New);
    }

    /// Remove a unit from the head document queue, dropping the queue
    /// itself once it empties.
    fn pop_unit(&mut self, key: &UnitKey) {
        let Some(doc) = self.docs.front_mut() else {
            return;
        };
        doc.remove(key);
        if doc.complete() {
            self.docs.pop_front();
        }
    }

    fn current_unit(&self) -> Option<&ExecUnit> {
        let key = self.current.as_ref()?;
        self.docs.front()?.unit(key)
    }

    fn current_unit_mut(&mut self) -> Option<&mut ExecUnit> {
        let key = self.current.clone()?;
        self.docs.front_mut()?.unit_mut(&key)
    }

    /// Execution scope of the current unit, from the unit itself or from
    /// its context if the unit is already gone.
    fn current_scope(&self) -> Option<ExecScope> {
        self.current_unit()
            .map(|unit| unit.scope)
            .or_else(|| self.context.as_ref().map(ChunkContext::scope))
    }

    /// Surface an incomplete-expression fault: raise an interpreter-visible
    /// error quoting the unterminated code, then inject a null input to
    /// force an interrupt back to a top-level prompt.
    fn send_incomplete_error(&mut self, key: &UnitKey) {
        let code = self
            .current_unit()
            .map(|unit| unit.executing_code().to_string())
            .unwrap_or_default();
        self.host
            .interpreter
            .raise_error(&format!("Incomplete expression: {}", code));

        self.send_console_input(&key.chunk_id, None);
    }

    /// Package code with its chunk id and hand it to the delivery worker.
    /// Never blocks on the interpreter.
    fn send_console_input(&self, chunk_id: &str, input: Option<&str>) {
        match console_input_request(chunk_id, input) {
            Ok(request) => self.submitter.submit(request),
            Err(e) => tracing::error!("dropping console input for chunk {}: {}", chunk_id, e),
        }
    }

    fn emit_state(&self, key: &UnitKey, exec_state: ExecState, options: Value) {
        self.host.events.emit(ClientEvent::ChunkExecStateChanged {
            doc_id: key.doc_id.clone(),
            chunk_id: key.chunk_id.clone(),
            exec_state,
            options,
        });
    }
}

fn empty_options() -> Value {
    Value::Object(Map::new())
}
