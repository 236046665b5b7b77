//! One-shot completion notifications for asynchronous stage calls.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::thread;
use std::time::Duration;

/// Creates a connected notifier/completion pair.
pub fn completion_pair<T>() -> (Notifier<T>, Completion<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Notifier { tx }, Completion { rx })
}

/// Sending half. `notify` consumes it, so it can fire at most once.
#[derive(Debug)]
pub struct Notifier<T> {
    tx: SyncSender<T>,
}

impl<T> Notifier<T> {
    pub fn notify(self, value: T) {
        // capacity 1 and a single send: never blocks; a dropped receiver is not our concern
        let _ = self.tx.send(value);
    }
}

/// Receiving half held by whoever waits for the stage to finish.
#[derive(Debug)]
pub struct Completion<T> {
    rx: Receiver<T>,
}

/// Outcome of a non-blocking check.
#[derive(Debug, PartialEq, Eq)]
pub enum Pending<T> {
    Ready(T),
    NotYet,
    /// The notifier was dropped without firing.
    Abandoned,
}

impl<T> Completion<T> {
    pub fn try_take(&self) -> Pending<T> {
        match self.rx.try_recv() {
            Ok(value) => Pending::Ready(value),
            Err(TryRecvError::Empty) => Pending::NotYet,
            Err(TryRecvError::Disconnected) => Pending::Abandoned,
        }
    }

    /// Polls until the notification arrives, sleeping with exponential backoff between
    /// checks and calling `progress` before each one. Returns `None` if it was abandoned.
    pub fn wait_with(&self, backoff: &Backoff, mut progress: impl FnMut()) -> Option<T> {
        let mut delay = backoff.initial;
        loop {
            progress();
            match self.try_take() {
                Pending::Ready(value) => return Some(value),
                Pending::Abandoned => return None,
                Pending::NotYet => {}
            }
            thread::sleep(delay);
            delay = (delay * 2).min(backoff.max);
        }
    }

    pub fn wait(&self, backoff: &Backoff) -> Option<T> {
        self.wait_with(backoff, || {})
    }
}

/// Sleep schedule for completion polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_micros(20),
            max: Duration::from_millis(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn value_crosses_threads() {
        let (notifier, completion) = completion_pair();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            notifier.notify(41 + 1);
        });
        assert_eq!(completion.wait(&Backoff::default()), Some(42));
        worker.join().unwrap();
    }

    #[test]
    fn dropped_notifier_is_reported() {
        let (notifier, completion) = completion_pair::<u8>();
        assert_eq!(completion.try_take(), Pending::NotYet);
        drop(notifier);
        assert_eq!(completion.try_take(), Pending::Abandoned);
        assert_eq!(completion.wait(&Backoff::default()), None);
    }

    #[test]
    fn progress_runs_until_ready() {
        let (notifier, completion) = completion_pair();
        let slot = Cell::new(Some(notifier));
        let calls = Cell::new(0);
        let value = completion.wait_with(&Backoff::default(), || {
            calls.set(calls.get() + 1);
            if calls.get() == 3 {
                if let Some(notifier) = slot.take() {
                    notifier.notify("done");
                }
            }
        });
        assert_eq!(value, Some("done"));
        assert_eq!(calls.get(), 3);
    }
}
