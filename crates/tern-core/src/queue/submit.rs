//! Background delivery of console input to the interpreter.
//!
//! The scheduler runs inside interpreter readiness callbacks, so sending a
//! command back into the interpreter from that call stack would block the
//! caller on itself. Submission is therefore decoupled: the scheduler
//! enqueues serialized commands on a channel and a dedicated worker thread
//! forwards them to the host's injection surface.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use serde_json::json;

use crate::error::{Error, Result};
use crate::host::ConsoleInjector;

/// Build the `console_input` request envelope for a piece of chunk code.
///
/// `input` of `None` encodes a null input, which forces the interpreter to
/// interrupt an unterminated expression and return to a top-level prompt.
pub(crate) fn console_input_request(chunk_id: &str, input: Option<&str>) -> Result<String> {
    let request = json!({
        "method": "console_input",
        "params": [input, chunk_id],
    });
    serde_json::to_string(&request)
        .map_err(|e| Error::Serialization(format!("failed to encode console input: {}", e)))
}

/// Worker that forwards queued console commands to the interpreter.
///
/// Delivery is best-effort: forwarding errors are logged and swallowed. A
/// command that is never delivered leaves its chunk waiting for a readiness
/// signal that will not arrive; the queue stays parked on that unit until
/// the user interrupts. Shutdown is signalled by closing the channel.
pub struct ConsoleSubmitter {
    tx: Option<Sender<String>>,
    worker: Option<JoinHandle<()>>,
}

impl ConsoleSubmitter {
    /// Launch the delivery worker.
    pub fn spawn(injector: Arc<dyn ConsoleInjector>) -> Result<Self> {
        let (tx, rx) = channel::<String>();
        let worker = std::thread::Builder::new()
            .name("tern-console-submit".to_string())
            .spawn(move || Self::deliver_loop(rx, injector))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    fn deliver_loop(rx: Receiver<String>, injector: Arc<dyn ConsoleInjector>) {
        // recv blocks until the next command; Err means the submitter was
        // dropped and the worker should exit
        while let Ok(request) = rx.recv() {
            if let Err(e) = injector.inject(&request) {
                tracing::error!("failed to deliver console input: {}", e);
            }
        }
    }

    /// Enqueue a serialized command for delivery. Non-blocking; returns
    /// before the interpreter evaluates anything.
    pub fn submit(&self, request: String) {
        if let Some(tx) = &self.tx
            && tx.send(request).is_err()
        {
            tracing::error!("console submitter worker is gone; dropping command");
        }
    }

    /// Close the channel and wait for the worker to drain and exit.
    pub fn shutdown(mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("console submitter worker panicked");
        }
    }
}

impl Drop for ConsoleSubmitter {
    fn drop(&mut self) {
        // Closing the channel lets the worker clean up asynchronously; it is
        // not joined here because it may be blocked inside the injector
        self.tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    struct ChannelInjector {
        tx: Mutex<mpsc::Sender<String>>,
    }

    impl ConsoleInjector for ChannelInjector {
        fn inject(&self, request: &str) -> Result<()> {
            self.tx.lock().unwrap().send(request.to_string()).unwrap();
            Ok(())
        }
    }

    struct FlakyInjector {
        tx: Mutex<mpsc::Sender<String>>,
    }

    impl ConsoleInjector for FlakyInjector {
        fn inject(&self, request: &str) -> Result<()> {
            self.tx.lock().unwrap().send(request.to_string()).unwrap();
            Err(Error::Injection("connection refused".to_string()))
        }
    }

    #[test]
    fn test_envelope_shape() {
        let request = console_input_request("c1", Some("x <- 1\n")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert_eq!(value["method"], "console_input");
        assert_eq!(value["params"][0], "x <- 1\n");
        assert_eq!(value["params"][1], "c1");
    }

    #[test]
    fn test_null_input_envelope() {
        let request = console_input_request("c1", None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert!(value["params"][0].is_null());
        assert_eq!(value["params"][1], "c1");
    }

    #[test]
    fn test_commands_delivered_in_order() {
        let (tx, rx) = mpsc::channel();
        let submitter = ConsoleSubmitter::spawn(Arc::new(ChannelInjector { tx: Mutex::new(tx) }))
            .expect("spawn worker");

        submitter.submit("one".to_string());
        submitter.submit("two".to_string());
        submitter.submit("three".to_string());

        for expected in ["one", "two", "three"] {
            let got = rx.recv_timeout(Duration::from_secs(5)).expect("delivery");
            assert_eq!(got, expected);
        }
        submitter.shutdown();
    }

    #[test]
    fn test_delivery_failure_does_not_stop_worker() {
        let (tx, rx) = mpsc::channel();
        let submitter = ConsoleSubmitter::spawn(Arc::new(FlakyInjector { tx: Mutex::new(tx) }))
            .expect("spawn worker");

        submitter.submit("first".to_string());
        submitter.submit("second".to_string());

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "first");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");
        submitter.shutdown();
    }

    #[test]
    fn test_shutdown_joins_worker() {
        let (tx, _rx) = mpsc::channel();
        let submitter = ConsoleSubmitter::spawn(Arc::new(ChannelInjector { tx: Mutex::new(tx) }))
            .expect("spawn worker");
        // Returns only after the worker observed the closed channel
        submitter.shutdown();
    }
}
