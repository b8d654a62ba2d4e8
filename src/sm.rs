/// Core boundary interface and the Streaming Multiprocessor that implements it.
///
/// Warp instructions and the memory system never drive a core directly; they
/// go through [`Core`] to park warps at barriers, retire them, and ask
/// whether a warp still has atomics in flight.
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::GpuConfig;

/// What any timing-model core must provide.
pub trait Core {
    /// The simulated device this core belongs to.
    type Device;

    fn set_at_barrier(&mut self, cta_id: u32, warp_id: u32);
    fn warp_exit(&mut self, warp_id: u32);
    fn warp_waiting_at_barrier(&self, warp_id: u32) -> bool;
    fn warp_waiting_for_atomics(&self, warp_id: u32) -> bool;
    fn gpu(&self) -> &Self::Device;
}

/// Per-warp bookkeeping on an SM.
#[derive(Debug, Clone, Default)]
struct WarpStatus {
    cta_id: u32,
    at_barrier: bool,
    exited: bool,
    pending_atomics: u32,
}

/// Streaming Multiprocessor (SM) — the core compute unit of a GPU.
/// Holds the warps of the CTAs resident on it and their synchronization
/// state; instruction timing lives elsewhere.
pub struct StreamingMultiprocessor {
    pub id: usize,
    config: Arc<GpuConfig>,
    warps: HashMap<u32, WarpStatus>,
    barriers_released: u64,
}

impl StreamingMultiprocessor {
    pub fn new(id: usize, config: Arc<GpuConfig>) -> Self {
        StreamingMultiprocessor {
            id,
            config,
            warps: HashMap::new(),
            barriers_released: 0,
        }
    }

    /// Make warp `warp_id` of CTA `cta_id` resident. Returns false if the
    /// SM is already at its warp limit.
    pub fn launch_warp(&mut self, cta_id: u32, warp_id: u32) -> bool {
        if self.live_warps() >= self.config.max_warps_per_sm && !self.warps.contains_key(&warp_id) {
            return false;
        }
        self.warps.insert(
            warp_id,
            WarpStatus {
                cta_id,
                ..WarpStatus::default()
            },
        );
        true
    }

    pub fn atomic_issued(&mut self, warp_id: u32) {
        if let Some(w) = self.warps.get_mut(&warp_id) {
            w.pending_atomics += 1;
        }
    }

    pub fn atomic_completed(&mut self, warp_id: u32) {
        if let Some(w) = self.warps.get_mut(&warp_id) {
            debug_assert!(w.pending_atomics > 0, "atomic completion without issue");
            w.pending_atomics = w.pending_atomics.saturating_sub(1);
        }
    }

    pub fn live_warps(&self) -> usize {
        self.warps.values().filter(|w| !w.exited).count()
    }

    /// Number of distinct CTAs with at least one live warp
    pub fn active_ctas(&self) -> usize {
        let mut ctas: Vec<u32> = self
            .warps
            .values()
            .filter(|w| !w.exited)
            .map(|w| w.cta_id)
            .collect();
        ctas.sort_unstable();
        ctas.dedup();
        ctas.len()
    }

    /// Number of CTA barriers completed on this SM
    pub fn barriers_released(&self) -> u64 {
        self.barriers_released
    }

    /// Forget exited warps.
    pub fn retire_exited(&mut self) {
        self.warps.retain(|_, w| !w.exited);
    }

    /// Release the barrier for `cta_id` once every live warp of it has arrived.
    fn try_release_barrier(&mut self, cta_id: u32) {
        let mut members = self
            .warps
            .values()
            .filter(|w| w.cta_id == cta_id && !w.exited)
            .peekable();
        if members.peek().is_none() {
            return;
        }
        if members.all(|w| w.at_barrier) {
            for w in self.warps.values_mut().filter(|w| w.cta_id == cta_id) {
                w.at_barrier = false;
            }
            self.barriers_released += 1;
            tracing::trace!(sm = self.id, cta_id, "barrier released");
        }
    }
}

impl Core for StreamingMultiprocessor {
    type Device = GpuConfig;

    fn set_at_barrier(&mut self, cta_id: u32, warp_id: u32) {
        if let Some(w) = self.warps.get_mut(&warp_id) {
            assert_eq!(w.cta_id, cta_id, "warp {} is not in cta {}", warp_id, cta_id);
            w.at_barrier = true;
        }
        self.try_release_barrier(cta_id);
    }

    fn warp_exit(&mut self, warp_id: u32) {
        let cta_id = match self.warps.get_mut(&warp_id) {
            Some(w) => {
                w.exited = true;
                w.at_barrier = false;
                w.cta_id
            }
            None => return,
        };
        // the remaining warps may all be waiting on this one
        self.try_release_barrier(cta_id);
    }

    fn warp_waiting_at_barrier(&self, warp_id: u32) -> bool {
        self.warps.get(&warp_id).is_some_and(|w| w.at_barrier)
    }

    fn warp_waiting_for_atomics(&self, warp_id: u32) -> bool {
        self.warps.get(&warp_id).is_some_and(|w| w.pending_atomics > 0)
    }

    fn gpu(&self) -> &GpuConfig {
        &self.config
    }
}
