use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

/// How the composite stage is throttled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingMode {
    /// Render as fast as the pipeline allows (file generation).
    Unpaced,
    /// Throttle to one frame per interval (preview-style output).
    Paced(Duration),
}

struct BundleSlot {
    mode: PacingMode,
    refs: usize,
}

struct RegistryState {
    display_open: bool,
    bundles: Vec<BundleSlot>,
}

/// Registry of render-context bundles, owned by one pipeline instance.
///
/// Each bundle pairs a target surface with a pacing policy. Bundles are
/// created on first acquire for a given mode, shared by refcount, and torn
/// down when the last handle drops. The shared display connection lives as
/// long as any bundle does: opened with the first, closed with the last.
#[derive(Clone)]
pub struct RenderContextRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl Default for RenderContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContextRegistry {
    /// An empty registry with no display connection.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                display_open: false,
                bundles: Vec::new(),
            })),
        }
    }

    /// Acquire a context handle for `mode`, creating the bundle (and the
    /// display connection) if this is the first live handle.
    pub fn acquire(&self, mode: PacingMode) -> ContextHandle {
        if let Ok(mut state) = self.state.lock() {
            if !state.display_open {
                debug!("opening display connection");
                state.display_open = true;
            }
            match state.bundles.iter_mut().find(|b| b.mode == mode) {
                Some(slot) => slot.refs += 1,
                None => {
                    debug!(?mode, "creating render context bundle");
                    state.bundles.push(BundleSlot { mode, refs: 1 });
                }
            }
        }
        ContextHandle {
            state: Arc::clone(&self.state),
            mode,
            next_deadline: None,
        }
    }

    /// Whether the display connection is currently open.
    pub fn display_open(&self) -> bool {
        self.state.lock().map(|s| s.display_open).unwrap_or(false)
    }

    /// Number of live context bundles.
    pub fn live_bundles(&self) -> usize {
        self.state.lock().map(|s| s.bundles.len()).unwrap_or(0)
    }
}

/// Refcounted handle to a render-context bundle.
///
/// Dropping the handle releases its reference; the bundle is destroyed with
/// the last reference and the display connection closes with the last bundle.
pub struct ContextHandle {
    state: Arc<Mutex<RegistryState>>,
    mode: PacingMode,
    next_deadline: Option<Instant>,
}

impl ContextHandle {
    /// The pacing mode this handle was acquired with.
    pub fn mode(&self) -> PacingMode {
        self.mode
    }

    /// Apply the bundle's pacing policy: sleep until the next frame deadline
    /// when paced, return immediately when unpaced.
    pub fn throttle(&mut self) {
        let PacingMode::Paced(interval) = self.mode else {
            return;
        };
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Schedule from the deadline, not from wakeup, so drift is bounded.
        self.next_deadline = Some(deadline.max(now) + interval);
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(i) = state.bundles.iter().position(|b| b.mode == self.mode) {
                state.bundles[i].refs -= 1;
                if state.bundles[i].refs == 0 {
                    debug!(mode = ?self.mode, "destroying render context bundle");
                    state.bundles.remove(i);
                }
            }
            if state.bundles.is_empty() && state.display_open {
                debug!("closing display connection");
                state.display_open = false;
            }
        }
    }
}
