//! Dedicated worker thread plumbing shared by both dispatch workers
//!
//! A worker sleeps on a single-slot wake channel with a timeout, so it runs
//! a pass at least once per interval and right away when signalled. Signals
//! arriving while a pass runs coalesce into one extra pass.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::WorkerError;

/// Cloneable signal that wakes a worker early
#[derive(Clone)]
pub struct Wakeup {
    tx: Sender<()>,
}

impl Wakeup {
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::trace!("Wake signal sent to a stopped worker");
            }
        }
    }
}

/// Create a wake signal and the receiving end for the worker loop
pub(crate) fn wake_channel() -> (Wakeup, Receiver<()>) {
    let (tx, rx) = bounded(1);
    (Wakeup { tx }, rx)
}

/// A running worker thread
pub(crate) struct WorkerThread {
    name: String,
    running: Arc<AtomicBool>,
    wakeup: Wakeup,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawn a thread running `pass` until stopped
    ///
    /// `pass` gets the running flag so it can bail out of a long backlog.
    pub(crate) fn spawn<F>(
        name: String,
        interval: Duration,
        wakeup: Wakeup,
        wake_rx: Receiver<()>,
        mut pass: F,
    ) -> Result<Self, WorkerError>
    where
        F: FnMut(&AtomicBool) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread_name = name.clone();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::debug!(worker = %thread_name, "Worker started");
                while flag.load(Ordering::Acquire) {
                    match wake_rx.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if !flag.load(Ordering::Acquire) {
                        break;
                    }
                    pass(&flag);
                }
                tracing::debug!(worker = %thread_name, "Worker exited");
            })
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            name,
            running,
            wakeup,
            handle: Some(handle),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signal the thread and block until it has exited
    pub(crate) fn stop(&mut self) -> Result<(), WorkerError> {
        let Some(handle) = self.handle.take() else {
            return Err(WorkerError::AlreadyStopped);
        };
        self.running.store(false, Ordering::Release);
        self.wakeup.notify();
        if handle.join().is_err() {
            tracing::error!(worker = %self.name, "Worker thread panicked");
        }
        Ok(())
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
