use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use gpumodel::config::GpuConfig;
use gpumodel::gpu::GPU;
use gpumodel::inst::{OpType, Renderable, ScalarInstruction};
use gpumodel::kernel::{Dim3, FunctionInfo, KernelInfo, LaunchConfig};
use gpumodel::memory::{MemoryOp, MemorySpace, MemorySpaceKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Entry point for the demo kernel.
struct Histogram;

impl FunctionInfo for Histogram {
    fn name(&self) -> &str {
        "histogram"
    }

    fn code_size(&self) -> usize {
        3 * 8
    }
}

fn instruction(pc: u32, op: OpType) -> ScalarInstruction {
    let mut inst = ScalarInstruction::placeholder();
    inst.pc = pc;
    inst.isize = 8;
    inst.op = op;
    inst.cycles = 1;
    inst
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Optional device config: gpumodel [config.json]
    let config = match std::env::args().nth(1) {
        Some(path) => GpuConfig::from_file(path)?,
        None => GpuConfig::h100(),
    };
    let mut gpu = GPU::new(config)?;
    println!(
        "Initialized {} with {} SMs, warp size {}",
        gpu.config.name,
        gpu.sms.len(),
        gpu.warp_size(),
    );

    // --- Histogram demo ---
    // bins[i % NUM_BINS] += 1 for every thread i, as a global atomic add
    const NUM_BINS: usize = 16;
    let n: u32 = 1000;
    let bins: Arc<Vec<AtomicU32>> = Arc::new((0..NUM_BINS).map(|_| AtomicU32::new(0)).collect());

    let mut atom = instruction(0x08, OpType::Store);
    atom.memory_op = MemoryOp::Store;
    atom.data_size = 4;
    atom.space = MemorySpace::new(MemorySpaceKind::Global);
    let program = [
        instruction(0x00, OpType::Alu),
        atom,
        instruction(0x10, OpType::Barrier),
    ];

    let threads_per_block = 128u32;
    let launch = LaunchConfig::new(Dim3::x(n.div_ceil(threads_per_block)), Dim3::x(threads_per_block))
        .with_arg(&(n as u64).to_le_bytes());
    let mut kernel = KernelInfo::from_launch(&launch, Arc::new(Histogram));

    let mut sample = None;
    let stats = gpu.launch_kernel(&mut kernel, &program, |warp, ctx| {
        if warp.inst.op != OpType::Store {
            return;
        }
        for lane in 0..ctx.thread_ids.len() {
            let gid = ctx.global_id(lane);
            if gid >= n as u64 {
                continue;
            }
            let bin = gid as usize % NUM_BINS;
            warp.set_addr(lane, 0x1000 + 4 * bin as u64);
            let bins = Arc::clone(&bins);
            warp.add_callback(lane, move |_| {
                bins[bin].fetch_add(1, Ordering::Relaxed);
            });
        }
        if sample.is_none() {
            sample = Some(warp.render());
        }
    })?;

    let total: u32 = bins.iter().map(|b| b.load(Ordering::Relaxed)).sum();
    if total == n {
        println!("Verification PASSED: {} atomic updates across {} bins", total, NUM_BINS);
    } else {
        println!("MISMATCH: {} atomic updates, expected {}", total, n);
    }
    if let Some(line) = sample {
        println!("First atomic warp instruction:{}", line);
    }

    println!(
        "Stats: {} blocks | {} warps | {} threads | {} warp insts | {} atomics | {} cycles",
        stats.blocks_executed,
        stats.warps_executed,
        stats.threads_executed,
        stats.instructions_issued,
        stats.atomics_delivered,
        stats.cycles,
    );
    Ok(())
}
