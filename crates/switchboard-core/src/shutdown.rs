//! Cooperative shutdown phases over a watch channel.
//!
//! The process moves `Running → Draining → Terminated`, never backward.
//! The controller side belongs to the manager; every other task holds a
//! [`ShutdownToken`] and awaits the draining edge instead of being
//! cancelled from outside.

use tokio::sync::watch;

/// Lifecycle phase of the whole process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Accepting connections and processing commands.
    Running,
    /// No new admissions; existing work finishing within the grace period.
    Draining,
    /// All supervision has ended.
    Terminated,
}

/// Write side of the shutdown phase. Owned by the manager.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<Phase>,
}

impl ShutdownController {
    /// Create a controller in the `Running` phase.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Running);
        Self { tx }
    }

    /// Hand out a read-only token.
    #[must_use]
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Advance to `Draining`. Returns `false` if the phase was already at
    /// or past it; transitions never go backward.
    pub fn begin_drain(&self) -> bool {
        self.advance(Phase::Draining)
    }

    /// Advance to `Terminated`. Returns `false` if already there.
    pub fn terminate(&self) -> bool {
        self.advance(Phase::Terminated)
    }

    fn advance(&self, to: Phase) -> bool {
        self.tx.send_if_modified(|phase| {
            if *phase < to {
                *phase = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the shutdown phase; cheap to clone, one per task.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    rx: watch::Receiver<Phase>,
}

impl ShutdownToken {
    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.rx.borrow()
    }

    /// Whether draining has begun (or already finished).
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.phase() >= Phase::Draining
    }

    /// Resolve once the phase reaches `Draining`.
    ///
    /// Also resolves if the controller disappears: a vanished controller
    /// means supervision is gone and waiting any longer would deadlock.
    pub async fn draining(&mut self) {
        let _ = self.rx.wait_for(|phase| *phase >= Phase::Draining).await;
    }

    /// Resolve once the phase reaches `Terminated` (or the controller is
    /// gone).
    pub async fn terminated(&mut self) {
        let _ = self.rx.wait_for(|phase| *phase >= Phase::Terminated).await;
    }
}
