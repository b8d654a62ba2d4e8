/// Kernel launch data and the kernel work enumerator.
/// A kernel launch is a grid of thread blocks (CTAs); the enumerator hands out
/// the next unissued block and thread coordinate in x-then-y-then-z order,
/// mirroring how the CUDA execution model numbers them.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// 3D dimension struct used for grid and block sizes (mirrors CUDA's dim3).
/// Also used for block and thread coordinates within those bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Dim3 { x, y, z }
    }

    /// Convenience constructor for 1D configs
    pub fn x(x: u32) -> Self {
        Dim3 { x, y: 1, z: 1 }
    }

    pub fn zero() -> Self {
        Dim3 { x: 0, y: 0, z: 0 }
    }

    /// Total number of threads/blocks in this dimension
    pub fn size(&self) -> usize {
        self.x as usize * self.y as usize * self.z as usize
    }
}

impl std::fmt::Display for Dim3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// Advance `i` by one step in odometer order: x first, carrying into y, then z.
///
/// `z` is never reset, so once the last coordinate has been passed `i.z`
/// equals `bound.z` and the caller detects completion by comparing against
/// the bound.
pub fn increment_x_then_y_then_z(i: &mut Dim3, bound: &Dim3) {
    i.x += 1;
    if i.x >= bound.x {
        i.x = 0;
        i.y += 1;
        if i.y >= bound.y {
            i.y = 0;
            i.z += 1;
        }
    }
}

/// Resource usage reported for a kernel (register count, memory footprints,
/// target version). Zero when no resource report is available. Carried for
/// schedulers and occupancy models; this layer does not interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KernelResources {
    /// Local memory bytes per thread
    pub lmem: u32,
    /// Shared memory bytes per block
    pub smem: u32,
    /// Constant memory bytes
    pub cmem: u32,
    /// Registers per thread
    pub regs: u32,
    pub ptx_version: u32,
    pub sm_target: u32,
}

/// One kernel argument: an opaque byte blob plus its size and its offset in
/// the parameter buffer.
#[derive(Debug, Clone, Default)]
pub struct KernelArg {
    pub data: Option<Arc<[u8]>>,
    pub nbytes: usize,
    pub offset: usize,
}

impl KernelArg {
    pub fn new(data: &[u8], offset: usize) -> Self {
        KernelArg {
            data: Some(Arc::from(data)),
            nbytes: data.len(),
            offset,
        }
    }
}

pub type KernelArgList = Vec<KernelArg>;

/// Configuration for launching a kernel: how many blocks (grid) and
/// how many threads per block (block), plus the launch-time payload.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub grid_dim: Dim3,
    pub block_dim: Dim3,
    pub resources: KernelResources,
    pub args: KernelArgList,
}

impl LaunchConfig {
    pub fn new(grid_dim: Dim3, block_dim: Dim3) -> Self {
        LaunchConfig {
            grid_dim,
            block_dim,
            resources: KernelResources::default(),
            args: Vec::new(),
        }
    }

    pub fn with_resources(mut self, regs_per_thread: u32, smem_per_block: u32) -> Self {
        self.resources.regs = regs_per_thread;
        self.resources.smem = smem_per_block;
        self
    }

    /// Append an argument; its offset follows the previous argument.
    pub fn with_arg(mut self, data: &[u8]) -> Self {
        let offset = self.args.last().map(|a| a.offset + a.nbytes).unwrap_or(0);
        self.args.push(KernelArg::new(data, offset));
        self
    }

    /// Total number of thread blocks in the grid
    pub fn num_blocks(&self) -> usize {
        self.grid_dim.size()
    }

    /// Total number of threads per block
    pub fn threads_per_block(&self) -> usize {
        self.block_dim.size()
    }
}

/// A kernel entry point as produced by the program loader/decoder.
pub trait FunctionInfo: Send + Sync {
    fn name(&self) -> &str;

    /// Size of the kernel's code in bytes
    fn code_size(&self) -> usize;
}

/// Work enumerator for one kernel launch.
///
/// Tracks the next block to hand to a core and, within that block, the next
/// thread to place into a warp. Advanced by a single owner (the block
/// scheduler); there is no internal locking.
#[derive(Clone)]
pub struct KernelInfo {
    valid: bool,
    entry: Option<Arc<dyn FunctionInfo>>,
    grid_dim: Dim3,
    block_dim: Dim3,
    next_cta: Dim3,
    next_tid: Dim3,
}

impl KernelInfo {
    /// An enumerator with no kernel bound to it.
    pub fn invalid() -> Self {
        KernelInfo {
            valid: false,
            entry: None,
            grid_dim: Dim3::zero(),
            block_dim: Dim3::zero(),
            next_cta: Dim3::zero(),
            next_tid: Dim3::zero(),
        }
    }

    pub fn new(grid_dim: Dim3, block_dim: Dim3, entry: Arc<dyn FunctionInfo>) -> Self {
        tracing::debug!(
            kernel = entry.name(),
            grid = %grid_dim,
            block = %block_dim,
            "kernel bound"
        );
        KernelInfo {
            valid: true,
            entry: Some(entry),
            grid_dim,
            block_dim,
            next_cta: Dim3::zero(),
            next_tid: Dim3::zero(),
        }
    }

    pub fn from_launch(config: &LaunchConfig, entry: Arc<dyn FunctionInfo>) -> Self {
        Self::new(config.grid_dim, config.block_dim, entry)
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn entry(&self) -> Option<&Arc<dyn FunctionInfo>> {
        self.entry.as_ref()
    }

    pub fn name(&self) -> &str {
        self.entry.as_ref().map(|e| e.name()).unwrap_or("<none>")
    }

    pub fn num_blocks(&self) -> usize {
        self.grid_dim.size()
    }

    pub fn threads_per_cta(&self) -> usize {
        self.block_dim.size()
    }

    pub fn grid_dim(&self) -> Dim3 {
        self.grid_dim
    }

    pub fn cta_dim(&self) -> Dim3 {
        self.block_dim
    }

    /// Move on to the next block; thread enumeration restarts at (0,0,0).
    pub fn increment_cta_id(&mut self) {
        increment_x_then_y_then_z(&mut self.next_cta, &self.grid_dim);
        self.next_tid = Dim3::zero();
        tracing::trace!(next_cta = %self.next_cta, "cta advanced");
    }

    pub fn get_next_cta_id(&self) -> Dim3 {
        self.next_cta
    }

    /// Linear index of the next block, x fastest.
    pub fn get_next_cta_id_flat(&self) -> usize {
        let g = self.grid_dim;
        let c = self.next_cta;
        c.x as usize + g.x as usize * (c.y as usize + g.y as usize * c.z as usize)
    }

    pub fn no_more_ctas_to_run(&self) -> bool {
        self.next_cta.x >= self.grid_dim.x
            || self.next_cta.y >= self.grid_dim.y
            || self.next_cta.z >= self.grid_dim.z
    }

    pub fn increment_thread_id(&mut self) {
        increment_x_then_y_then_z(&mut self.next_tid, &self.block_dim);
    }

    pub fn get_next_thread_id_3d(&self) -> Dim3 {
        self.next_tid
    }

    /// Flat thread index within the block: x + bx*y + bx*by*z.
    /// This is the thread-to-lane numbering used everywhere else.
    /// Wraps modulo 2^32 for blocks whose thread count exceeds `u32`.
    pub fn get_next_thread_id(&self) -> u32 {
        let b = self.block_dim;
        let t = self.next_tid;
        t.x.wrapping_add(b.x.wrapping_mul(t.y))
            .wrapping_add(b.x.wrapping_mul(b.y).wrapping_mul(t.z))
    }

    /// Compares every axis against its own bound.
    pub fn more_threads_in_cta(&self) -> bool {
        self.next_tid.x < self.block_dim.x
            && self.next_tid.y < self.block_dim.y
            && self.next_tid.z < self.block_dim.z
    }
}

impl Default for KernelInfo {
    fn default() -> Self {
        Self::invalid()
    }
}

impl std::fmt::Debug for KernelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelInfo")
            .field("valid", &self.valid)
            .field("entry", &self.name())
            .field("grid_dim", &self.grid_dim)
            .field("block_dim", &self.block_dim)
            .field("next_cta", &self.next_cta)
            .field("next_tid", &self.next_tid)
            .finish()
    }
}
