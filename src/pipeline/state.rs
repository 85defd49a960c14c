//! Run-phase state machine and shared progress snapshot.
//!
//! [`RunPhase`] drives the coordinator's lifecycle. Anything outside the
//! coordinator (the binary's progress output, tests) reads it through
//! [`SharedStatus`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

// ---------------------------------------------------------------------------
// RunPhase
// ---------------------------------------------------------------------------

/// Phases of one analysis run.
///
/// ```text
/// Idle ──start──▶ Running ──deadline / interrupt──▶ Stopping ──joined──▶ Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Constructed, no worker started yet.
    #[default]
    Idle,

    /// Workers are capturing; the coordinator is draining and analysing.
    Running,

    /// The running flag is cleared; workers are being joined.
    Stopping,

    /// Every worker has been joined or abandoned; results are final.
    Done,
}

impl RunPhase {
    /// Returns `true` while workers may still be alive.
    ///
    /// ```
    /// use lyrebird_analyzer::pipeline::RunPhase;
    ///
    /// assert!(!RunPhase::Idle.is_active());
    /// assert!(RunPhase::Running.is_active());
    /// assert!(RunPhase::Stopping.is_active());
    /// assert!(!RunPhase::Done.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        matches!(self, RunPhase::Running | RunPhase::Stopping)
    }

    /// A short human-readable label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            RunPhase::Idle => "Idle",
            RunPhase::Running => "Running",
            RunPhase::Stopping => "Stopping",
            RunPhase::Done => "Done",
        }
    }

    /// Whether `next` is the phase that legally follows `self`.
    pub fn can_advance_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Idle, RunPhase::Running)
                | (RunPhase::Running, RunPhase::Stopping)
                | (RunPhase::Stopping, RunPhase::Done)
        )
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Snapshot of a run, updated by the coordinator.
#[derive(Debug, Clone, Default)]
pub struct RunStatus {
    pub phase: RunPhase,

    /// Seconds since the workers were started.
    pub elapsed_secs: f64,

    /// Configured run length in seconds.
    pub duration_secs: f64,

    /// Frames analysed so far, per stream in configuration order.
    pub frames: Vec<(String, usize)>,
}

impl RunStatus {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            ..Self::default()
        }
    }

    /// Move to `next`, logging the transition. Illegal transitions are
    /// ignored.
    pub fn advance(&mut self, next: RunPhase) {
        if self.phase.can_advance_to(next) {
            log::debug!("run: {} → {}", self.phase.label(), next.label());
            self.phase = next;
        } else {
            log::warn!(
                "run: ignoring transition {} → {}",
                self.phase.label(),
                next.label()
            );
        }
    }

    pub fn remaining_secs(&self) -> f64 {
        (self.duration_secs - self.elapsed_secs).max(0.0)
    }

    pub fn total_frames(&self) -> usize {
        self.frames.iter().map(|(_, n)| n).sum()
    }
}

// ---------------------------------------------------------------------------
// SharedStatus
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`RunStatus`].
///
/// Cheap to clone (`Arc` clone). Do **not** hold the lock across `.await`.
pub type SharedStatus = Arc<Mutex<RunStatus>>;

pub fn new_shared_status(duration_secs: f64) -> SharedStatus {
    Arc::new(Mutex::new(RunStatus::new(duration_secs)))
}

/// Lock `status`, recovering the value if a holder panicked.
pub fn lock_status(status: &SharedStatus) -> MutexGuard<'_, RunStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
