//! Execution queue: units, document queues, chunk contexts, the console
//! delivery worker, and the scheduler that drives them.

pub mod context;
pub mod doc;
pub mod scheduler;
pub mod service;
pub mod submit;
pub mod unit;

pub use context::{ChunkContext, ErrorFlag};
pub use doc::{CommitMode, DocQueue, DocQueueSnapshot, QueueOp};
pub use scheduler::NotebookQueue;
pub use service::QueueService;
pub use submit::ConsoleSubmitter;
pub use unit::{ChunkOptions, ExecMode, ExecRange, ExecScope, ExecUnit, ExprMode, UnitKey};
