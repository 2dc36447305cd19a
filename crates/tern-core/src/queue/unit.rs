//! Execution units: the smallest resumable pieces of queued work.
//!
//! A unit is one chunk's (or one line's) remaining source ranges, plus the
//! declared execution mode and scope. Units arrive as host payloads, are
//! consumed range by range by the scheduler, and are removed from their
//! document queue on completion, on skip, or on a global clear.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// How a unit was queued for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Queued as part of a batch; the `eval` option decides whether it runs.
    Batch,
    /// Driven line by line from direct user input.
    Interactive,
}

/// Where completion is defined for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecScope {
    /// Completion at the chunk boundary.
    Chunk,
    /// Completion at a single line boundary.
    Line,
}

/// Whether a readiness signal indicates a fresh top-level prompt or a
/// continuation-of-expression prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprMode {
    New,
    Continuation,
}

/// A contiguous byte span of a chunk's source representing one executable step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRange {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// Stop byte offset (exclusive).
    pub stop: usize,
}

impl ExecRange {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }
}

/// Lightweight identity of a unit, used as the scheduler's current-unit
/// pointer. The owning document queue is the only owner of the unit itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub doc_id: String,
    pub chunk_id: String,
}

/// Recognized chunk options, parsed lazily from the raw option object.
///
/// Unknown keys are not an error; they pass through verbatim to the client
/// in notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOptions {
    /// Execution engine for the chunk. Defaults to the primary interpreter.
    pub engine: String,
    /// Whether a batch unit should be evaluated at all. Defaults to true.
    pub eval: bool,
    /// Whether evaluation errors are tolerated for this chunk. Defaults to false.
    pub error: bool,
}

impl ChunkOptions {
    /// Parse recognized options out of a raw option object.
    ///
    /// `Null` means no options were declared. Anything other than an object
    /// or a mistyped recognized key is an error; the scheduler skips such
    /// units rather than guessing.
    pub fn parse(raw: &Value, primary_engine: &str) -> Result<Self> {
        let mut options = Self {
            engine: primary_engine.to_string(),
            eval: true,
            error: false,
        };

        let map = match raw {
            Value::Null => return Ok(options),
            Value::Object(map) => map,
            other => {
                return Err(Error::Options(format!(
                    "expected an option object, got {}",
                    other
                )));
            }
        };

        if let Some(engine) = map.get("engine") {
            options.engine = engine
                .as_str()
                .ok_or_else(|| Error::Options(format!("engine must be a string, got {}", engine)))?
                .to_string();
        }
        if let Some(eval) = map.get("eval") {
            options.eval = eval
                .as_bool()
                .ok_or_else(|| Error::Options(format!("eval must be a boolean, got {}", eval)))?;
        }
        if let Some(error) = map.get("error") {
            options.error = error
                .as_bool()
                .ok_or_else(|| Error::Options(format!("error must be a boolean, got {}", error)))?;
        }

        Ok(options)
    }
}

/// One chunk's remaining work: pending source ranges plus execution mode,
/// scope, and raw options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecUnit {
    /// Owning document.
    pub doc_id: String,
    /// Chunk within the document.
    pub chunk_id: String,
    /// Batch or interactive execution.
    pub mode: ExecMode,
    /// Chunk or line completion granularity.
    pub scope: ExecScope,
    /// The chunk's full source text.
    pub code: String,
    /// Ranges still to execute, in order. Consuming the next range is
    /// destructive.
    pub pending: VecDeque<ExecRange>,
    /// Opaque chunk options, parsed lazily into [`ChunkOptions`].
    #[serde(default)]
    pub options: Value,
    /// The span currently being executed, extended across continuation
    /// prompts so an incomplete expression can be quoted in full.
    #[serde(skip)]
    executing: Option<ExecRange>,
}

impl ExecUnit {
    pub fn new(
        doc_id: impl Into<String>,
        chunk_id: impl Into<String>,
        mode: ExecMode,
        scope: ExecScope,
        code: impl Into<String>,
        pending: impl IntoIterator<Item = ExecRange>,
        options: Value,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id: chunk_id.into(),
            mode,
            scope,
            code: code.into(),
            pending: pending.into_iter().collect(),
            options,
            executing: None,
        }
    }

    /// Identity of this unit.
    pub fn key(&self) -> UnitKey {
        UnitKey {
            doc_id: self.doc_id.clone(),
            chunk_id: self.chunk_id.clone(),
        }
    }

    /// A unit is complete iff no ranges remain to execute.
    pub fn complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pop the next pending range, yielding it with its literal source text.
    ///
    /// Under a continuation prompt the popped range extends the executing
    /// span instead of replacing it, so [`executing_code`](Self::executing_code)
    /// covers the whole unterminated expression.
    pub fn pop_exec_range(&mut self, mode: ExprMode) -> Option<(ExecRange, String)> {
        let range = self.pending.pop_front()?;
        let code = self.range_code(range).unwrap_or_default().to_string();

        self.executing = match (mode, self.executing) {
            (ExprMode::Continuation, Some(executing)) => {
                Some(ExecRange::new(executing.start, range.stop))
            }
            _ => Some(range),
        };

        Some((range, code))
    }

    /// Source text of the span currently being executed, or empty if none.
    pub fn executing_code(&self) -> &str {
        self.executing
            .and_then(|range| self.range_code(range).ok())
            .unwrap_or_default()
    }

    /// Resolve the unit's full inner source as a single string, for handoff
    /// to an alternate engine.
    pub fn inner_code(&self) -> Result<String> {
        let mut code = String::new();
        for &range in &self.pending {
            code.push_str(self.range_code(range)?);
        }
        Ok(code)
    }

    fn range_code(&self, range: ExecRange) -> Result<&str> {
        self.code.get(range.start..range.stop).ok_or_else(|| {
            Error::Source(format!(
                "range {}..{} is outside chunk {} ({} bytes)",
                range.start,
                range.stop,
                self.chunk_id,
                self.code.len()
            ))
        })
    }
}
