//! Per-chunk execution context for primary-engine units.
//!
//! A context is bound 1:1 to the currently executing unit while its chunk
//! runs on the primary interpreter. It tracks evaluation errors, carries the
//! chunk's parsed options and output geometry, and owns the subscription to
//! the interpreter's output stream for the duration of the chunk. It must be
//! detached when the chunk finishes; a context that stays attached leaks
//! output into the next chunk.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::host::{ConsoleStream, StreamWatch};

use super::unit::{ChunkOptions, ExecScope};

/// Shared flag recording whether the interpreter reported an error while a
/// chunk was executing.
///
/// The flag can be cloned and handed to the console stream; any clone can
/// set it and all clones observe the change.
#[derive(Clone, Default)]
pub struct ErrorFlag {
    errored: Arc<AtomicBool>,
}

impl ErrorFlag {
    pub fn new() -> Self {
        Self {
            errored: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record that an error occurred.
    pub fn set(&self) {
        self.errored.store(true, Ordering::Relaxed);
    }

    /// Whether any error has been recorded since attachment.
    pub fn is_set(&self) -> bool {
        self.errored.load(Ordering::Relaxed)
    }
}

/// Runtime state attached to the interpreter while a chunk is active.
pub struct ChunkContext {
    doc_id: String,
    chunk_id: String,
    ctx_id: String,
    scope: ExecScope,
    options: ChunkOptions,
    raw_options: Value,
    pixel_width: u32,
    char_width: u32,
    errors: ErrorFlag,
    /// Hooks fired before each new top-level expression of the same chunk.
    expr_hooks: Vec<Box<dyn FnMut() + Send>>,
    /// Detach handlers, run in reverse order on disconnect.
    detach_handlers: Vec<Box<dyn FnOnce() + Send>>,
    connected: bool,
}

impl ChunkContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        doc_id: impl Into<String>,
        chunk_id: impl Into<String>,
        ctx_id: impl Into<String>,
        scope: ExecScope,
        options: ChunkOptions,
        raw_options: Value,
        pixel_width: u32,
        char_width: u32,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id: chunk_id.into(),
            ctx_id: ctx_id.into(),
            scope,
            options,
            raw_options,
            pixel_width,
            char_width,
            errors: ErrorFlag::new(),
            expr_hooks: Vec::new(),
            detach_handlers: Vec::new(),
            connected: false,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn ctx_id(&self) -> &str {
        &self.ctx_id
    }

    pub fn scope(&self) -> ExecScope {
        self.scope
    }

    /// Recognized options the chunk was dispatched with.
    pub fn options(&self) -> &ChunkOptions {
        &self.options
    }

    /// The chunk's raw option object, forwarded verbatim in notifications.
    pub fn raw_options(&self) -> &Value {
        &self.raw_options
    }

    /// Whether the interpreter reported an error since attachment.
    pub fn has_errors(&self) -> bool {
        self.errors.is_set()
    }

    /// A cloneable handle to the chunk's error flag.
    pub fn errors(&self) -> ErrorFlag {
        self.errors.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Attach the chunk to the interpreter's output/error stream.
    pub fn connect(&mut self, stream: &dyn ConsoleStream) {
        let detach = stream.attach(StreamWatch {
            doc_id: self.doc_id.clone(),
            chunk_id: self.chunk_id.clone(),
            ctx_id: self.ctx_id.clone(),
            pixel_width: self.pixel_width,
            char_width: self.char_width,
            errors: self.errors.clone(),
        });
        self.detach_handlers.push(detach);
        self.connected = true;
    }

    /// Register a hook fired before each new top-level expression.
    pub fn on_expr_complete(&mut self, hook: impl FnMut() + Send + 'static) {
        self.expr_hooks.push(Box::new(hook));
    }

    /// Fire expression-complete hooks, letting output collaborators commit
    /// the previous expression's output.
    pub fn expr_complete(&mut self) {
        for hook in &mut self.expr_hooks {
            hook();
        }
    }

    /// Detach from the output stream, running detach handlers in reverse
    /// order. Safe to call more than once.
    pub fn disconnect(&mut self) {
        while let Some(handler) = self.detach_handlers.pop() {
            // Catch panics so every handler runs
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(handler));
            if let Err(e) = result {
                tracing::error!(
                    "detach handler for chunk {} panicked: {:?}",
                    self.chunk_id,
                    e
                );
            }
        }
        self.connected = false;
    }
}

impl Drop for ChunkContext {
    fn drop(&mut self) {
        // A leaked subscription would bleed output into the next chunk
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Detach;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn context() -> ChunkContext {
        ChunkContext::new(
            "d1",
            "c1",
            "ctx",
            ExecScope::Chunk,
            ChunkOptions::parse(&Value::Null, "r").unwrap(),
            Value::Null,
            640,
            80,
        )
    }

    struct CountingStream {
        attached: AtomicUsize,
        detached: Arc<AtomicUsize>,
    }

    impl CountingStream {
        fn new() -> Self {
            Self {
                attached: AtomicUsize::new(0),
                detached: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ConsoleStream for CountingStream {
        fn attach(&self, _watch: StreamWatch) -> Detach {
            self.attached.fetch_add(1, Ordering::SeqCst);
            let detached = self.detached.clone();
            Box::new(move || {
                detached.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[test]
    fn test_error_flag_shared_across_clones() {
        let flag = ErrorFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_set());

        clone.set();
        assert!(flag.is_set());
        assert!(clone.is_set());
    }

    #[test]
    fn test_connect_and_disconnect() {
        let stream = CountingStream::new();
        let detached = stream.detached.clone();

        let mut ctx = context();
        assert!(!ctx.is_connected());

        ctx.connect(&stream);
        assert!(ctx.is_connected());
        assert_eq!(stream.attached.load(Ordering::SeqCst), 1);

        ctx.disconnect();
        assert!(!ctx.is_connected());
        assert_eq!(detached.load(Ordering::SeqCst), 1);

        // Disconnect twice is safe and does not detach twice
        ctx.disconnect();
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_detaches() {
        let stream = CountingStream::new();
        let detached = stream.detached.clone();

        {
            let mut ctx = context();
            ctx.connect(&stream);
        }
        assert_eq!(detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stream_observes_errors_through_flag() {
        let seen = Arc::new(Mutex::new(None::<ErrorFlag>));
        struct CapturingStream(Arc<Mutex<Option<ErrorFlag>>>);
        impl ConsoleStream for CapturingStream {
            fn attach(&self, watch: StreamWatch) -> Detach {
                *self.0.lock().unwrap() = Some(watch.errors);
                Box::new(|| {})
            }
        }

        let mut ctx = context();
        ctx.connect(&CapturingStream(seen.clone()));
        assert!(!ctx.has_errors());

        seen.lock().unwrap().as_ref().unwrap().set();
        assert!(ctx.has_errors());
    }

    #[test]
    fn test_expr_hooks_fire_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();

        let mut ctx = context();
        ctx.on_expr_complete(move || first.lock().unwrap().push(1));
        ctx.on_expr_complete(move || second.lock().unwrap().push(2));

        ctx.expr_complete();
        ctx.expr_complete();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 1, 2]);
    }
}
