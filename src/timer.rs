use std::ops::ControlFlow;
use std::time::Duration;
use tracing::debug;

use crate::schedule::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Engaged,
}

/// Start/stop toggle that emits one tick per period while engaged.
///
/// Each engagement gets a fresh epoch that is passed to every tick it
/// produces. A tick whose epoch is not [`SessionTimer::is_current`] belongs
/// to a schedule that has already been cancelled and must be ignored.
pub struct SessionTimer {
    period: Duration,
    active: Option<(u64, Schedule)>,
    last_epoch: u64,
}

impl SessionTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            active: None,
            last_epoch: 0,
        }
    }

    pub fn state(&self) -> TimerState {
        match &self.active {
            Some((_, schedule)) if !schedule.is_finished() => TimerState::Engaged,
            _ => TimerState::Idle,
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.state() == TimerState::Engaged
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        matches!(&self.active, Some((current, _)) if *current == epoch)
    }

    /// Returns the new epoch, or `None` if already engaged.
    pub fn engage<F>(&mut self, mut on_tick: F) -> Option<u64>
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        if self.is_engaged() {
            return None;
        }
        self.active = None;

        self.last_epoch += 1;
        let epoch = self.last_epoch;
        let schedule = Schedule::spawn("session-timer", self.period, move || on_tick(epoch));
        self.active = Some((epoch, schedule));
        debug!("Session timer engaged, epoch {}", epoch);
        Some(epoch)
    }

    /// Returns true if a running schedule was stopped.
    pub fn disengage(&mut self) -> bool {
        let was_engaged = self.is_engaged();
        if let Some((epoch, _schedule)) = self.active.take() {
            debug!("Session timer disengaged, epoch {}", epoch);
        }
        was_engaged
    }
}
