use std::sync::{Condvar, Mutex};

use crate::foundation::error::{SkyError, SkyResult};

/// The three pipeline phases, cycled in order for every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The decoder owns the shared surface and may publish a frame.
    Decode,
    /// The compositor owns the surface and may read and render it.
    Render,
    /// The encoder owns the rendered output and may submit it.
    Encode,
}

impl Phase {
    fn index(self) -> u64 {
        match self {
            Phase::Decode => 0,
            Phase::Render => 1,
            Phase::Encode => 2,
        }
    }
}

/// What a stage found when its phase came up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// The phase is this stage's; proceed and call [`PhaseBarrier::advance`].
    Open,
    /// End of stream was signalled; wind down without advancing.
    Shutdown,
}

struct BarrierState {
    counter: u64,
    eos: bool,
    aborted: bool,
}

/// Blocking single-permit barrier serializing the three stages.
///
/// Exactly one frame is in flight at any time: the permit cycles
/// decode, render, encode, decode, ... and each stage blocks on a condvar
/// until the cycle reaches it. [`PhaseBarrier::finish`] releases all waiters
/// for orderly end-of-stream teardown; [`PhaseBarrier::abort`] releases them
/// as an error so no stage is left stranded after a failure elsewhere.
pub struct PhaseBarrier {
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl Default for PhaseBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseBarrier {
    /// A fresh barrier with the permit at [`Phase::Decode`].
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BarrierState {
                counter: 0,
                eos: false,
                aborted: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Block until `target` holds the permit, end of stream, or abort.
    pub fn await_phase(&self, target: Phase) -> SkyResult<Gate> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SkyError::encoding("phase barrier poisoned"))?;
        loop {
            if state.aborted {
                return Err(SkyError::Aborted);
            }
            if state.eos {
                return Ok(Gate::Shutdown);
            }
            if state.counter % 3 == target.index() {
                return Ok(Gate::Open);
            }
            state = self
                .cond
                .wait(state)
                .map_err(|_| SkyError::encoding("phase barrier poisoned"))?;
        }
    }

    /// Hand the permit to the next phase. Called by the stage that currently
    /// holds it.
    pub fn advance(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.counter += 1;
            self.cond.notify_all();
        }
    }

    /// Block until the in-flight frame has fully drained, which is the moment
    /// the permit comes back around to [`Phase::Decode`].
    pub fn await_drain_complete(&self) -> SkyResult<Gate> {
        self.await_phase(Phase::Decode)
    }

    /// Signal orderly end of stream: every current and future wait returns
    /// [`Gate::Shutdown`].
    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.eos = true;
            self.cond.notify_all();
        }
    }

    /// Tear the barrier down after a failure: every current and future wait
    /// returns [`SkyError::Aborted`].
    pub fn abort(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.aborted = true;
            self.cond.notify_all();
        }
    }
}
