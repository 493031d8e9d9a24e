//! Ctrl+C routing shared by every run in the process
//!
//! A single listener owns the signal. While a test run is active an interrupt
//! is forwarded to it as a shutdown broadcast; with nothing running the
//! process should exit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// What the listener should do with one Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// A run is active and has been asked to stop
    Forwarded,
    /// Nothing is running
    Exit,
}

/// Shared shutdown channel plus a count of active runs
#[derive(Debug, Clone)]
pub struct Interrupts {
    tx: broadcast::Sender<()>,
    active: Arc<AtomicUsize>,
}

impl Interrupts {
    /// Create an idle router
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Receiver for interrupts delivered from now on
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Sender handed to components that subscribe on their own
    pub fn sender(&self) -> broadcast::Sender<()> {
        self.tx.clone()
    }

    /// Mark a run as active until the returned guard is dropped
    pub fn activate(&self) -> ActiveRun {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveRun {
            active: Arc::clone(&self.active),
        }
    }

    /// Whether any run is active
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Route one Ctrl+C
    pub fn interrupt(&self) -> InterruptAction {
        if !self.is_active() {
            return InterruptAction::Exit;
        }
        // No receiver only means the run is between phases
        let _ = self.tx.send(());
        InterruptAction::Forwarded
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard returned by [`Interrupts::activate`]
#[derive(Debug)]
pub struct ActiveRun {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_idle_interrupt_exits() {
        let interrupts = Interrupts::new();
        let mut rx = interrupts.subscribe();

        assert_eq!(interrupts.interrupt(), InterruptAction::Exit);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_active_run_receives_interrupt() {
        let interrupts = Interrupts::new();
        let _run = interrupts.activate();
        let mut rx = interrupts.subscribe();

        assert_eq!(interrupts.interrupt(), InterruptAction::Forwarded);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_every_run_gets_its_own_interrupt() {
        let interrupts = Interrupts::new();

        for _ in 0..3 {
            let run = interrupts.activate();
            let mut rx = interrupts.subscribe();
            assert_eq!(interrupts.interrupt(), InterruptAction::Forwarded);
            assert!(rx.try_recv().is_ok());
            drop(run);

            assert!(!interrupts.is_active());
            assert_eq!(interrupts.interrupt(), InterruptAction::Exit);
        }
    }

    #[test]
    fn test_late_subscriber_misses_earlier_interrupt() {
        let interrupts = Interrupts::new();
        {
            let _run = interrupts.activate();
            let _first = interrupts.subscribe();
            interrupts.interrupt();
        }

        let _run = interrupts.activate();
        let mut rx = interrupts.subscribe();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_clones_share_state() {
        let interrupts = Interrupts::new();
        let listener = interrupts.clone();
        let run = interrupts.activate();
        assert!(listener.is_active());
        drop(run);
        assert!(!listener.is_active());
    }
}
