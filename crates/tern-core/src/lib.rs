//! Core execution-queue engine for Tern interactive notebooks.
//!
//! This crate provides:
//! - Scheduling of chunk execution across queued documents
//! - Per-document unit queues with live-edit mutation
//! - Chunk execution contexts with error tracking
//! - Background console input delivery
//! - Client event notifications

pub mod error;
pub mod events;
pub mod host;
pub mod queue;

pub use error::{Error, Result};
pub use events::{ClientEvent, EventSink, ExecState};
pub use host::{
    AltChunk, AlternateEngine, ConsoleInjector, ConsoleStream, Detach, Host, Interpreter,
    QueueConfig, StreamWatch,
};
pub use queue::{
    ChunkContext, ChunkOptions, CommitMode, ConsoleSubmitter, DocQueue, DocQueueSnapshot,
    ErrorFlag, ExecMode, ExecRange, ExecScope, ExecUnit, ExprMode, NotebookQueue, QueueOp,
    QueueService, UnitKey,
};
