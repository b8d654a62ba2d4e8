/// Top-level simulated device.
/// Models a GPU as a collection of Streaming Multiprocessors (SMs) sharing
/// one configuration, which also serves as the device context every core
/// hands back through `Core::gpu`.
use std::sync::Arc;

use crate::config::GpuConfig;
use crate::error::Result;
use crate::executor::{ExecutionStats, KernelExecutor, WarpContext};
use crate::inst::ScalarInstruction;
use crate::kernel::KernelInfo;
use crate::sm::StreamingMultiprocessor;
use crate::warp::WarpInstruction;

pub struct GPU {
    /// All SMs on the GPU
    pub sms: Vec<StreamingMultiprocessor>,
    pub config: Arc<GpuConfig>,
}

impl GPU {
    /// Build a device from `config`, rejecting configurations the executor
    /// cannot run (no SMs, zero-width or over-wide warps).
    pub fn new(config: GpuConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    /// Create an H100-like GPU configuration.
    pub fn h100() -> Self {
        Self::from_valid(GpuConfig::h100())
    }

    fn from_valid(config: GpuConfig) -> Self {
        let config = Arc::new(config);
        let sms = (0..config.num_sms)
            .map(|id| StreamingMultiprocessor::new(id, Arc::clone(&config)))
            .collect();
        GPU { sms, config }
    }

    pub fn warp_size(&self) -> usize {
        self.config.warp_size
    }

    /// Run every CTA of `kernel` through `program`, calling `on_issue` for
    /// each issued warp instruction.
    pub fn launch_kernel<F>(
        &mut self,
        kernel: &mut KernelInfo,
        program: &[ScalarInstruction],
        on_issue: F,
    ) -> Result<ExecutionStats>
    where
        F: FnMut(&mut WarpInstruction, &WarpContext),
    {
        let mut executor = KernelExecutor::new(self);
        executor.launch(kernel, program, on_issue)
    }
}
