//! Collaborator interfaces at the edges of the execution queue.
//!
//! The scheduler treats the interpreter, the client event transport, the
//! command loopback, and the alternate-engine subsystem as external
//! collaborators specified only at their seams. Hosts implement these traits
//! and hand the scheduler a [`Host`] bundle.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::events::EventSink;
use crate::queue::ErrorFlag;

/// Host-supplied scheduler configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Engine name of the primary in-process interpreter. Chunks declaring
    /// any other engine are handed to the [`AlternateEngine`] collaborator.
    pub primary_engine: String,
    /// Cache context id for saved documents.
    pub saved_ctx_id: String,
    /// Cache context id for documents with unsaved changes.
    pub unsaved_ctx_id: String,
    /// Prompt text the interpreter shows when it expects the continuation
    /// of an unterminated expression.
    pub continuation_prompt: String,
}

/// The primary interpreter's readiness surface.
pub trait Interpreter: Send + Sync {
    /// Whether the interpreter is mid-evaluation and not yet at a prompt.
    /// The scheduler defers while this is true.
    fn is_evaluating(&self) -> bool;

    /// Raise a user-visible error through the interpreter's own output
    /// stream.
    fn raise_error(&self, message: &str);
}

/// Unsubscribe closure returned by [`ConsoleStream::attach`].
pub type Detach = Box<dyn FnOnce() + Send>;

/// Everything the output stream needs to route a chunk's console output.
pub struct StreamWatch {
    pub doc_id: String,
    pub chunk_id: String,
    /// Cache context the chunk's output is stored against.
    pub ctx_id: String,
    /// Output width in pixels, for rendered output.
    pub pixel_width: u32,
    /// Output width in characters, for console output.
    pub char_width: u32,
    /// Set by the stream when the interpreter reports an error.
    pub errors: ErrorFlag,
}

/// The interpreter's output/error stream.
///
/// A chunk context attaches for the duration of its chunk and detaches on
/// completion; the returned closure tears the subscription down.
pub trait ConsoleStream: Send + Sync {
    fn attach(&self, watch: StreamWatch) -> Detach;
}

/// One-way, best-effort loopback for injecting commands into the
/// interpreter's console. Runs out of the scheduler's call stack.
pub trait ConsoleInjector: Send + Sync {
    fn inject(&self, request: &str) -> Result<()>;
}

/// A chunk handed off to an engine other than the primary interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct AltChunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub ctx_id: String,
    pub engine: String,
    /// The chunk's full inner source.
    pub code: String,
    /// Raw chunk options.
    pub options: Value,
}

/// The alternate-engine execution subsystem.
///
/// Completion is reported back later through the host's
/// chunk-execution-completed notification, not through this call.
pub trait AlternateEngine: Send + Sync {
    fn execute_chunk(&self, chunk: AltChunk) -> Result<()>;
}

/// Bundle of collaborator handles the scheduler runs against.
#[derive(Clone)]
pub struct Host {
    pub interpreter: Arc<dyn Interpreter>,
    pub console: Arc<dyn ConsoleStream>,
    pub engines: Arc<dyn AlternateEngine>,
    pub events: Arc<dyn EventSink>,
    pub injector: Arc<dyn ConsoleInjector>,
}
