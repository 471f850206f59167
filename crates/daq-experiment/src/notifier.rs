//! Out-of-band delivery of timepoint state changes.
//!
//! Observers run on a dedicated thread fed by a bounded channel, so a slow or
//! blocking observer never stalls the acquisition thread that caused the
//! transition. When the queue is full the notification is dropped and a
//! warning is logged.

use crate::timepoint::TimepointState;
use daq_core::limits::NOTIFY_QUEUE_DEPTH;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread;

pub(crate) struct StateNotifier {
    tx: SyncSender<TimepointState>,
}

impl StateNotifier {
    /// Start the notifier thread. It exits once the notifier is dropped and
    /// the queue has drained.
    pub(crate) fn spawn<F>(observer: F) -> std::io::Result<Self>
    where
        F: Fn(TimepointState) + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<TimepointState>(NOTIFY_QUEUE_DEPTH);

        let _handle = thread::Builder::new()
            .name("timepoint-notifier".into())
            .spawn(move || {
                tracing::debug!("Timepoint notifier thread started");
                while let Ok(state) = rx.recv() {
                    observer(state);
                }
                tracing::debug!("Timepoint notifier thread exiting");
            })?;

        Ok(Self { tx })
    }

    /// Queue `state` for the observer without blocking.
    pub(crate) fn notify(&self, state: TimepointState) {
        match self.tx.try_send(state) {
            Ok(()) => {}
            Err(TrySendError::Full(state)) => {
                tracing::warn!(%state, "State observer queue full, dropping notification");
            }
            Err(TrySendError::Disconnected(state)) => {
                tracing::warn!(%state, "State observer thread has stopped");
            }
        }
    }
}

impl std::fmt::Debug for StateNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateNotifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing_test::traced_test;

    #[test]
    fn delivers_in_order_on_named_thread() {
        let (tx, rx) = mpsc::channel();
        let notifier = StateNotifier::spawn(move |state| {
            let name = thread::current().name().map(str::to_owned);
            let _ = tx.send((state, name));
        })
        .unwrap();

        notifier.notify(TimepointState::Paused);
        notifier.notify(TimepointState::Acquiring);

        let (first, name) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, TimepointState::Paused);
        assert_eq!(name.as_deref(), Some("timepoint-notifier"));
        let (second, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second, TimepointState::Acquiring);
    }

    #[test]
    #[traced_test]
    fn full_queue_drops_instead_of_blocking() {
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();
        let observer_gate = Arc::clone(&gate);
        let notifier = StateNotifier::spawn(move |_| {
            let _open = observer_gate.lock().unwrap();
        })
        .unwrap();

        // At most one in the observer plus NOTIFY_QUEUE_DEPTH queued
        for _ in 0..NOTIFY_QUEUE_DEPTH + 8 {
            notifier.notify(TimepointState::Paused);
        }
        assert!(logs_contain("State observer queue full"));

        drop(held);
        drop(notifier);
    }
}
