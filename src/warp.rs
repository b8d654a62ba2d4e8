/// Warp instruction: one instruction executing across the lanes of a warp.
/// A warp is a group of up to 32 threads executing in SIMT lockstep; the
/// active mask says which lanes take part in this particular instruction.
///
/// Pipeline stages hold a fixed pool of these slots and recycle them with
/// `clear()` / `issue()` instead of reallocating every cycle.
use crate::callback::DeferredCallback;
use crate::error::{ModelError, Result};
use crate::inst::{Renderable, ScalarInstruction};

pub const MAX_WARP_SIZE: usize = 32;

/// Standard CUDA warp size
pub const WARP_SIZE: usize = 32;

/// Effective memory address type
pub type NewAddr = u64;

/// Per-lane active bits. Lane `i` is active iff bit `i` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ActiveMask(u32);

impl ActiveMask {
    pub fn new(bits: u32) -> Self {
        ActiveMask(bits)
    }

    /// All lanes of a `width`-wide warp
    pub fn full(width: usize) -> Self {
        assert!(width <= MAX_WARP_SIZE);
        if width == MAX_WARP_SIZE {
            ActiveMask(u32::MAX)
        } else {
            ActiveMask((1u32 << width) - 1)
        }
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn test(&self, lane: usize) -> bool {
        lane < MAX_WARP_SIZE && self.0 & (1 << lane) != 0
    }

    pub fn set(&mut self, lane: usize) {
        assert!(lane < MAX_WARP_SIZE, "lane {} out of range", lane);
        self.0 |= 1 << lane;
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Active lane indices, ascending
    pub fn lanes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_WARP_SIZE).filter(move |&i| self.test(i))
    }
}

/// Everything tracked for a single lane of a memory or atomic instruction.
#[derive(Debug, Default)]
pub struct LaneInfo {
    /// Effective address
    pub addr: NewAddr,
    pub callback: Option<DeferredCallback>,
    pub cache_miss: bool,
}

/// Per-lane storage, allocated the first time any lane needs it.
#[derive(Debug, Default)]
pub enum LaneState {
    #[default]
    Unallocated,
    PerLane(Vec<LaneInfo>),
}

#[derive(Debug)]
pub struct WarpInstruction {
    pub inst: ScalarInstruction,
    warp_size: usize,
    empty: bool,
    isatomic: bool,
    warp_id: u32,
    issue_cycle: u64,
    active_mask: ActiveMask,
    lanes: LaneState,
}

impl WarpInstruction {
    /// An empty slot for a `warp_size`-wide warp.
    ///
    /// Panics if `warp_size` exceeds [`MAX_WARP_SIZE`]; use [`Self::try_new`]
    /// when the width comes from user configuration.
    pub fn new(warp_size: usize) -> Self {
        assert!(
            warp_size <= MAX_WARP_SIZE,
            "warp size {} exceeds {}",
            warp_size,
            MAX_WARP_SIZE
        );
        WarpInstruction {
            inst: ScalarInstruction::placeholder(),
            warp_size,
            empty: true,
            isatomic: false,
            warp_id: 0,
            issue_cycle: 0,
            active_mask: ActiveMask::default(),
            lanes: LaneState::Unallocated,
        }
    }

    pub fn try_new(warp_size: usize) -> Result<Self> {
        if warp_size > MAX_WARP_SIZE {
            return Err(ModelError::WarpSizeTooLarge(warp_size));
        }
        Ok(Self::new(warp_size))
    }

    /// Occupy this slot: record the active lanes, the owning warp and the cycle.
    pub fn issue(&mut self, mask: u32, warp_id: u32, cycle: u64) {
        assert!(self.empty, "issue into an occupied slot (warp {})", self.warp_id);
        for lane in (0..self.warp_size).rev() {
            if mask & (1 << lane) != 0 {
                self.active_mask.set(lane);
            }
        }
        self.warp_id = warp_id;
        self.issue_cycle = cycle;
        self.empty = false;
        tracing::trace!(
            warp_id,
            cycle,
            mask = self.active_mask.bits(),
            pc = self.inst.pc,
            "warp instruction issued"
        );
    }

    /// Return the slot to empty. The per-lane storage stays allocated for
    /// reuse but its contents are reset.
    pub fn clear(&mut self) {
        self.empty = true;
        self.isatomic = false;
        self.warp_id = 0;
        self.issue_cycle = 0;
        self.active_mask = ActiveMask::default();
        if let LaneState::PerLane(lanes) = &mut self.lanes {
            for lane in lanes.iter_mut() {
                *lane = LaneInfo::default();
            }
        }
    }

    fn lanes_mut(&mut self) -> &mut Vec<LaneInfo> {
        if let LaneState::Unallocated = self.lanes {
            self.lanes = LaneState::PerLane((0..self.warp_size).map(|_| LaneInfo::default()).collect());
        }
        match &mut self.lanes {
            LaneState::PerLane(lanes) => lanes,
            LaneState::Unallocated => unreachable!(),
        }
    }

    fn lane(&self, n: usize) -> Option<&LaneInfo> {
        match &self.lanes {
            LaneState::PerLane(lanes) => lanes.get(n),
            LaneState::Unallocated => None,
        }
    }

    /// Record lane `n`'s effective address. Inactive lanes are accepted.
    pub fn set_addr(&mut self, n: usize, addr: NewAddr) {
        self.lanes_mut()[n].addr = addr;
    }

    /// Lane `n`'s effective address. Panics if no address was ever set on
    /// this slot; inactive lanes are not checked.
    pub fn get_addr(&self, n: usize) -> NewAddr {
        match &self.lanes {
            LaneState::PerLane(lanes) => lanes[n].addr,
            LaneState::Unallocated => panic!("get_addr({}) before any per-lane state was set", n),
        }
    }

    pub fn try_get_addr(&self, n: usize) -> Option<NewAddr> {
        self.lane(n).map(|l| l.addr)
    }

    pub fn set_cache_miss(&mut self, n: usize, miss: bool) {
        self.lanes_mut()[n].cache_miss = miss;
    }

    pub fn cache_miss(&self, n: usize) -> bool {
        self.lane(n).is_some_and(|l| l.cache_miss)
    }

    /// Register the completion work for lane `lane_id`. Registering any
    /// callback makes this an atomic instruction.
    pub fn add_callback<F>(&mut self, lane_id: usize, function: F)
    where
        F: FnOnce(&ScalarInstruction) + Send + 'static,
    {
        self.isatomic = true;
        self.lanes_mut()[lane_id].callback = Some(DeferredCallback::new(function));
    }

    /// Deliver every registered lane callback, each exactly once, in
    /// ascending lane order. Returns the number delivered.
    pub fn do_atomic(&mut self) -> usize {
        assert!(
            self.isatomic && !self.empty,
            "do_atomic on a non-atomic or empty instruction"
        );
        let inst = &self.inst;
        let mut delivered = 0;
        if let LaneState::PerLane(lanes) = &mut self.lanes {
            for lane in lanes.iter_mut() {
                if let Some(cb) = lane.callback.take() {
                    cb.invoke(inst);
                    delivered += 1;
                }
            }
        }
        tracing::debug!(warp_id = self.warp_id, pc = self.inst.pc, delivered, "atomic completed");
        delivered
    }

    pub fn active(&self, lane: usize) -> bool {
        self.active_mask.test(lane)
    }

    pub fn active_mask(&self) -> ActiveMask {
        self.active_mask
    }

    pub fn active_count(&self) -> u32 {
        self.active_mask.count()
    }

    pub fn empty(&self) -> bool {
        self.empty
    }

    pub fn warp_size(&self) -> usize {
        self.warp_size
    }

    pub fn warp_id(&self) -> u32 {
        assert!(!self.empty, "warp_id of an empty instruction");
        self.warp_id
    }

    pub fn issue_cycle(&self) -> u64 {
        assert!(!self.empty, "issue_cycle of an empty instruction");
        self.issue_cycle
    }

    /// Lane `n` is active and has a registered callback.
    pub fn has_callback(&self, n: usize) -> bool {
        self.active(n) && self.lane(n).is_some_and(|l| l.callback.is_some())
    }

    pub fn isatomic(&self) -> bool {
        self.isatomic
    }
}

impl Renderable for WarpInstruction {
    fn render(&self) -> String {
        let mut s = self.inst.render();
        for lane in (0..self.warp_size).rev() {
            s.push(if self.active(lane) { '1' } else { '0' });
        }
        s
    }
}

impl std::fmt::Display for WarpInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Hand the instruction in `src` to the empty slot `dst`, leaving `src`
/// empty. Both slots keep their allocations.
pub fn move_warp(dst: &mut WarpInstruction, src: &mut WarpInstruction) {
    assert!(dst.empty(), "move_warp into an occupied slot");
    std::mem::swap(dst, src);
    src.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_slot_is_empty() {
        let w = WarpInstruction::new(32);
        assert!(w.empty());
        assert!(!w.isatomic());
        assert!(!w.inst.valid());
        assert!((0..32).all(|i| !w.active(i)));
        assert!(w.try_get_addr(0).is_none());
    }

    #[test]
    fn test_try_new_rejects_wide_warps() {
        assert!(WarpInstruction::try_new(32).is_ok());
        assert!(matches!(
            WarpInstruction::try_new(33),
            Err(ModelError::WarpSizeTooLarge(33))
        ));
    }

    #[test]
    #[should_panic]
    fn test_new_panics_on_wide_warp() {
        let _ = WarpInstruction::new(64);
    }

    #[test]
    fn test_issue_sets_mask_and_ids() {
        let mut w = WarpInstruction::new(8);
        w.issue(0b1010_0101, 3, 100);
        assert!(!w.empty());
        assert_eq!(w.warp_id(), 3);
        assert_eq!(w.issue_cycle(), 100);
        let active: Vec<usize> = w.active_mask().lanes().collect();
        assert_eq!(active, vec![0, 2, 5, 7]);
        assert_eq!(w.active_count(), 4);
    }

    #[test]
    fn test_issue_ignores_bits_beyond_width() {
        let mut w = WarpInstruction::new(4);
        w.issue(0xff, 0, 0);
        assert_eq!(w.active_mask().bits(), 0xf);
        assert!(!w.active(4));
    }

    #[test]
    #[should_panic(expected = "occupied")]
    fn test_double_issue_panics() {
        let mut w = WarpInstruction::new(32);
        w.issue(1, 0, 0);
        w.issue(1, 0, 1);
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn test_warp_id_on_empty_panics() {
        let w = WarpInstruction::new(32);
        let _ = w.warp_id();
    }

    #[test]
    fn test_clear_returns_to_empty_and_reissues() {
        let mut w = WarpInstruction::new(32);
        w.issue(u32::MAX, 1, 5);
        w.set_addr(3, 0x1000);
        w.clear();
        assert!(w.empty());
        assert!((0..32).all(|i| !w.active(i)));
        // storage is kept, contents reset
        assert_eq!(w.try_get_addr(3), Some(0));

        w.issue(0b1, 2, 6);
        assert_eq!(w.warp_id(), 2);
        assert!(w.active(0));
        assert!(!w.active(1));
    }

    #[test]
    fn test_addr_on_inactive_lane() {
        let mut w = WarpInstruction::new(32);
        w.issue(0b1, 0, 0);
        w.set_addr(17, 0xdead_beef);
        assert!(!w.active(17));
        assert_eq!(w.get_addr(17), 0xdead_beef);
    }

    #[test]
    #[should_panic(expected = "get_addr")]
    fn test_get_addr_unallocated_panics() {
        let mut w = WarpInstruction::new(32);
        w.issue(u32::MAX, 0, 0);
        let _ = w.get_addr(0);
    }

    #[test]
    fn test_cache_miss_flag() {
        let mut w = WarpInstruction::new(32);
        assert!(!w.cache_miss(2));
        w.set_cache_miss(2, true);
        assert!(w.cache_miss(2));
        assert!(!w.cache_miss(3));
    }

    #[test]
    fn test_callback_marks_atomic_and_needs_active_lane() {
        let mut w = WarpInstruction::new(32);
        w.issue(0b01, 0, 0);
        w.add_callback(0, |_| {});
        w.add_callback(1, |_| {});
        assert!(w.isatomic());
        assert!(w.has_callback(0));
        assert!(!w.has_callback(1));
        assert!(!w.has_callback(2));
    }

    #[test]
    fn test_do_atomic_runs_each_callback_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut w = WarpInstruction::new(32);
        w.inst.pc = 0x40;
        w.issue(0b1011, 9, 0);
        for lane in [0usize, 1, 3] {
            let hits = Arc::clone(&hits);
            w.add_callback(lane, move |inst| {
                assert_eq!(inst.pc, 0x40);
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(w.do_atomic(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // already delivered
        assert_eq!(w.do_atomic(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_do_atomic_ascending_lane_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut w = WarpInstruction::new(8);
        w.issue(0xff, 0, 0);
        for lane in [5usize, 2, 7] {
            let order = Arc::clone(&order);
            w.add_callback(lane, move |_| order.lock().unwrap().push(lane));
        }
        w.do_atomic();
        assert_eq!(*order.lock().unwrap(), vec![2, 5, 7]);
    }

    #[test]
    #[should_panic(expected = "do_atomic")]
    fn test_do_atomic_requires_atomic() {
        let mut w = WarpInstruction::new(32);
        w.issue(1, 0, 0);
        w.do_atomic();
    }

    #[test]
    fn test_clear_drops_callbacks_and_atomic_flag() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut w = WarpInstruction::new(32);
        w.issue(1, 0, 0);
        let h = Arc::clone(&hits);
        w.add_callback(0, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        w.clear();
        assert!(!w.isatomic());

        w.issue(1, 0, 1);
        assert!(!w.has_callback(0));
        w.add_callback(0, |_| {});
        assert!(w.isatomic());
        assert_eq!(w.do_atomic(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_render_appends_mask_high_lane_first() {
        let mut w = WarpInstruction::new(4);
        w.inst.pc = 0x8;
        w.issue(0b0011, 0, 0);
        assert_eq!(w.render(), " [inst @ pc=0x0008] 0011");
    }

    #[test]
    fn test_move_warp() {
        let mut src = WarpInstruction::new(32);
        let mut dst = WarpInstruction::new(32);
        src.inst.pc = 0x20;
        src.issue(0b110, 4, 12);
        src.set_addr(1, 0x80);

        move_warp(&mut dst, &mut src);
        assert!(src.empty());
        assert_eq!(dst.warp_id(), 4);
        assert_eq!(dst.inst.pc, 0x20);
        assert_eq!(dst.get_addr(1), 0x80);
        assert!(dst.active(2));
    }

    #[test]
    fn test_full_mask() {
        assert_eq!(ActiveMask::full(32).bits(), u32::MAX);
        assert_eq!(ActiveMask::full(5).bits(), 0b11111);
        assert_eq!(ActiveMask::full(0).count(), 0);
    }
}
