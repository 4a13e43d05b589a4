//! Trailing-edge debouncer.
//!
//! Values pushed within `delay` of each other collapse into one delivery of
//! the last value once the input has been quiet for `delay`. Immediate pushes
//! skip the wait and cancel anything pending.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
enum Input<T> {
    Debounced(T),
    Immediate(T),
}

/// Handle for feeding a debouncer task. Dropping it stops the task.
#[derive(Debug)]
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<Input<T>>,
    handle: JoinHandle<()>,
}

/// The debouncer task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("debouncer stopped")]
pub struct DebouncerStopped;

impl<T: Send + 'static> Debouncer<T> {
    /// Spawns a debouncer that calls `on_settled` with each collapsed value.
    pub fn spawn<F>(delay: Duration, mut on_settled: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Input<T>>();

        let handle = tokio::spawn(async move {
            let mut pending: Option<T> = None;
            let mut deadline = Instant::now();

            loop {
                tokio::select! {
                    input = rx.recv() => match input {
                        Some(Input::Debounced(value)) => {
                            pending = Some(value);
                            deadline = Instant::now() + delay;
                        }
                        Some(Input::Immediate(value)) => {
                            pending = None;
                            on_settled(value);
                        }
                        None => break,
                    },
                    _ = sleep_until(deadline), if pending.is_some() => {
                        if let Some(value) = pending.take() {
                            on_settled(value);
                        }
                    }
                }
            }
        });

        Self { tx, handle }
    }

    /// Schedules `value`, restarting the quiet period.
    pub fn push(&self, value: T) -> Result<(), DebouncerStopped> {
        self.tx
            .send(Input::Debounced(value))
            .map_err(|_| DebouncerStopped)
    }

    /// Delivers `value` right away and discards any pending value.
    pub fn push_immediate(&self, value: T) -> Result<(), DebouncerStopped> {
        self.tx
            .send(Input::Immediate(value))
            .map_err(|_| DebouncerStopped)
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
