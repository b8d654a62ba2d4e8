/// Kernel issue driver.
/// Pulls thread blocks from a kernel's work enumerator, distributes them
/// across SMs (round-robin), groups each block's threads into warps, and
/// issues a straight-line program through a reused warp-instruction slot.
/// No timing is modeled: every issue advances the cycle counter by the
/// instruction's inverse throughput.
use std::path::PathBuf;

use crate::error::{ModelError, Result};
use crate::gpu::GPU;
use crate::inst::{OpType, ScalarInstruction};
use crate::kernel::{Dim3, KernelInfo};
use crate::metrics::{now_ms, write_metrics_to, LiveMetrics};
use crate::sm::Core;
use crate::warp::{ActiveMask, WarpInstruction};

/// Statistics collected during a kernel launch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExecutionStats {
    /// Total number of thread blocks executed
    pub blocks_executed: u32,
    /// Total number of warps executed
    pub warps_executed: u32,
    /// Total number of threads executed
    pub threads_executed: u32,
    /// Warp instructions issued
    pub instructions_issued: u64,
    /// Per-lane atomic callbacks delivered
    pub atomics_delivered: u64,
    /// Simulated cycle after the last issue
    pub cycles: u64,
}

/// Where an issued warp instruction came from. Passed to the issue hook so
/// it can compute per-lane addresses and register atomic callbacks.
#[derive(Debug, Clone)]
pub struct WarpContext {
    pub sm_id: usize,
    pub cta_id: Dim3,
    /// Flat CTA index, x fastest
    pub cta_flat: u32,
    pub warp_id: u32,
    /// Flat thread index within the CTA for each occupied lane
    pub thread_ids: Vec<u32>,
    pub block_dim: Dim3,
    pub cycle: u64,
}

impl WarpContext {
    /// Flat 1D global thread index of `lane`: cta * threads_per_cta + tid
    pub fn global_id(&self, lane: usize) -> u64 {
        self.cta_flat as u64 * self.block_dim.size() as u64 + self.thread_ids[lane] as u64
    }
}

/// Drives a kernel over the SMs of a GPU.
pub struct KernelExecutor<'a> {
    pub gpu: &'a mut GPU,
    metrics_path: Option<PathBuf>,
}

impl<'a> KernelExecutor<'a> {
    pub fn new(gpu: &'a mut GPU) -> Self {
        KernelExecutor {
            gpu,
            metrics_path: None,
        }
    }

    /// Write a live metrics snapshot to `path` after every block.
    pub fn with_metrics(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    /// Launch a kernel.
    /// Blocks are taken from `kernel` until it runs out; each block's threads
    /// are grouped into warps (the last warp may be partial) and every warp
    /// issues every instruction of `program` in order. `on_issue` runs once
    /// per issued warp instruction, before atomics are completed.
    ///
    /// Fails before issuing anything if one block needs more warps than an SM
    /// can hold.
    pub fn launch<F>(
        &mut self,
        kernel: &mut KernelInfo,
        program: &[ScalarInstruction],
        mut on_issue: F,
    ) -> Result<ExecutionStats>
    where
        F: FnMut(&mut WarpInstruction, &WarpContext),
    {
        let mut stats = ExecutionStats::default();
        if !kernel.valid() {
            tracing::warn!("launch of an unbound kernel ignored");
            return Ok(stats);
        }

        let num_sms = self.gpu.sms.len();
        let warp_size = self.gpu.warp_size();
        let max_warps = self.gpu.config.max_warps_per_sm;
        let warps_needed = kernel.threads_per_cta().div_ceil(warp_size);
        if warps_needed > max_warps {
            return Err(ModelError::CtaTooLarge { warps: warps_needed, max: max_warps });
        }
        let warps_per_cta = warps_needed as u32;
        let mut slot = WarpInstruction::new(warp_size);
        let mut cycle: u64 = 0;
        let mut sm_blocks = vec![0u32; num_sms];

        tracing::info!(
            kernel = kernel.name(),
            grid = %kernel.grid_dim(),
            block = %kernel.cta_dim(),
            "launching kernel"
        );

        while !kernel.no_more_ctas_to_run() {
            let cta_id = kernel.get_next_cta_id();
            let cta_flat = kernel.get_next_cta_id_flat() as u32;
            let sm_id = cta_flat as usize % num_sms;

            let warps = Self::form_warps(kernel, warp_size);
            let sm = &mut self.gpu.sms[sm_id];
            for w in 0..warps.len() as u32 {
                let warp_id = cta_flat * warps_per_cta + w;
                if !sm.launch_warp(cta_flat, warp_id) {
                    for launched in 0..w {
                        sm.warp_exit(cta_flat * warps_per_cta + launched);
                    }
                    sm.retire_exited();
                    return Err(ModelError::CtaTooLarge { warps: warps.len(), max: max_warps });
                }
            }

            for inst in program {
                for (w, threads) in warps.iter().enumerate() {
                    let warp_id = cta_flat * warps_per_cta + w as u32;
                    slot.inst.clone_from(inst);
                    slot.issue(ActiveMask::full(threads.len()).bits(), warp_id, cycle);

                    let ctx = WarpContext {
                        sm_id,
                        cta_id,
                        cta_flat,
                        warp_id,
                        thread_ids: threads.clone(),
                        block_dim: kernel.cta_dim(),
                        cycle,
                    };
                    on_issue(&mut slot, &ctx);

                    if slot.isatomic() {
                        sm.atomic_issued(warp_id);
                        stats.atomics_delivered += slot.do_atomic() as u64;
                        sm.atomic_completed(warp_id);
                    }
                    if inst.op == OpType::Barrier {
                        sm.set_at_barrier(cta_flat, warp_id);
                    }

                    stats.instructions_issued += 1;
                    slot.clear();
                    cycle += inst.cycles.max(1) as u64;
                }
            }

            for w in 0..warps.len() as u32 {
                sm.warp_exit(cta_flat * warps_per_cta + w);
            }
            sm.retire_exited();

            stats.blocks_executed += 1;
            stats.warps_executed += warps.len() as u32;
            stats.threads_executed += warps.iter().map(|t| t.len() as u32).sum::<u32>();
            sm_blocks[sm_id] += 1;

            kernel.increment_cta_id();

            if let Some(path) = &self.metrics_path {
                let snapshot = LiveMetrics {
                    status: if kernel.no_more_ctas_to_run() { "complete" } else { "running" }.to_string(),
                    kernel_name: kernel.name().to_string(),
                    grid: dim_array(kernel.grid_dim()),
                    block: dim_array(kernel.cta_dim()),
                    warp_size: warp_size as u32,
                    blocks_total: kernel.num_blocks() as u32,
                    blocks_executed: stats.blocks_executed,
                    warps_executed: stats.warps_executed,
                    threads_executed: stats.threads_executed,
                    instructions_issued: stats.instructions_issued,
                    atomics_delivered: stats.atomics_delivered,
                    sm_blocks_executed: sm_blocks.clone(),
                    timestamp_ms: now_ms(),
                };
                write_metrics_to(path, &snapshot);
            }
        }
        stats.cycles = cycle;

        tracing::info!(
            kernel = kernel.name(),
            blocks = stats.blocks_executed,
            warps = stats.warps_executed,
            threads = stats.threads_executed,
            "kernel complete"
        );

        Ok(stats)
    }

    /// Pull the current block's threads from the enumerator in lane order,
    /// `warp_size` at a time.
    fn form_warps(kernel: &mut KernelInfo, warp_size: usize) -> Vec<Vec<u32>> {
        let mut warps = Vec::new();
        let mut lanes = Vec::with_capacity(warp_size);
        while kernel.more_threads_in_cta() {
            lanes.push(kernel.get_next_thread_id());
            kernel.increment_thread_id();
            if lanes.len() == warp_size {
                warps.push(std::mem::replace(&mut lanes, Vec::with_capacity(warp_size)));
            }
        }
        if !lanes.is_empty() {
            warps.push(lanes);
        }
        warps
    }
}

fn dim_array(d: Dim3) -> [u32; 3] {
    [d.x, d.y, d.z]
}
