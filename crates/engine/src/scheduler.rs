//! Frame lifecycle and tick bookkeeping.
//!
//! The scheduler does not own a timer. A host calls [`Scheduler::begin_frame`]
//! on its own cadence and the scheduler decides whether a frame happens.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    lifecycle: Lifecycle,
    tick: u64,
}

impl Scheduler {
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn start(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Idle {
            self.lifecycle = Lifecycle::Running;
            return true;
        }
        false
    }

    pub fn pause(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Running {
            self.lifecycle = Lifecycle::Paused;
            return true;
        }
        false
    }

    pub fn resume(&mut self) -> bool {
        if self.lifecycle == Lifecycle::Paused {
            self.lifecycle = Lifecycle::Running;
            return true;
        }
        false
    }

    /// Terminal. A stopped scheduler never runs again.
    pub fn stop(&mut self) {
        self.lifecycle = Lifecycle::Stopped;
    }

    /// Advance the monotonic tick counter if running.
    pub fn begin_frame(&mut self) -> Option<u64> {
        if !self.is_running() {
            return None;
        }
        self.tick = self.tick.wrapping_add(1);
        Some(self.tick)
    }

    /// Low-frequency schedules hang off the main tick via modulo checks.
    pub fn every(&self, period: u64) -> bool {
        period > 0 && self.tick % period == 0
    }

    pub fn every_with_phase(&self, period: u64, phase: u64) -> bool {
        period > 0 && self.tick.wrapping_add(phase) % period == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitTicket(u64);

/// Guards async initialisation against completing into a torn-down scene.
#[derive(Debug, Default)]
pub struct InitGuard {
    generation: u64,
}

impl InitGuard {
    pub fn begin(&self) -> InitTicket {
        InitTicket(self.generation)
    }

    pub fn is_current(&self, ticket: InitTicket) -> bool {
        ticket.0 == self.generation
    }

    pub fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
