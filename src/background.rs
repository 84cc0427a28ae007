//! Periodic background work for the caches: the sweeper and the threshold scanner.
//!
//! Every task of a cache shares one shutdown channel.  Nothing is ever sent on it; tasks sleep in
//! [Receiver::recv_timeout], run one unit of work on each timeout, and exit as soon as the sender is dropped, which
//! wakes all of them at once without waiting out their current interval.
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{info, warn};

pub(crate) struct BackgroundTasks {
    shutdown: Option<Sender<()>>,
    receiver: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub(crate) fn new() -> BackgroundTasks {
        let (shutdown, receiver) = crossbeam_channel::bounded(0);
        BackgroundTasks {
            shutdown: Some(shutdown),
            receiver,
            handles: Vec::new(),
        }
    }

    /// Run `work` every `interval` on a new thread until shutdown.
    ///
    /// If the thread can't be started the failure is logged and the cache carries on without it; explicit cleanups
    /// still work.
    pub(crate) fn spawn<F>(&mut self, name: &str, interval: Duration, mut work: F)
    where
        F: FnMut() + Send + 'static,
    {
        if self.shutdown.is_none() {
            warn!(task = name, "not starting background task after shutdown");
            return;
        }

        let receiver = self.receiver.clone();
        let task = name.to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("weak-lru-{}", name))
            .spawn(move || {
                info!(task = %task, ?interval, "background task started");
                loop {
                    match receiver.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => work(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(task = %task, "background task stopped");
            });

        match spawned {
            Ok(handle) => self.handles.push(handle),
            Err(e) => warn!(task = name, error = %e, "failed to spawn background task"),
        }
    }

    #[cfg(test)]
    pub(crate) fn running(&self) -> usize {
        self.handles.len()
    }

    /// Signal every task and wait for them to exit.  Safe to call more than once.
    pub(crate) fn shutdown(&mut self) {
        drop(self.shutdown.take());
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("background task panicked");
            }
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.shutdown();
    }
}
