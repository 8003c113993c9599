use std::time::Duration;

use tokio::time::Instant;

/// Single-slot trailing-edge debouncer.
///
/// Queuing replaces whatever was pending and restarts the delay; there is
/// no maximum wait.
#[derive(Debug)]
pub(super) struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub(super) const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub(super) fn queue(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub(super) fn take_ready(&mut self, now: Instant) -> Option<T> {
        let deadline = self.deadline()?;
        if now >= deadline {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }

    pub(super) fn cancel(&mut self) {
        self.pending = None;
    }

    pub(super) const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
