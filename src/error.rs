/// Error types for the hardware model.
///
/// Structural misuse inside the simulation loop (issuing into a busy slot,
/// reading the warp id of an empty instruction) panics. The errors here cover
/// the surfaces where the caller can reasonably recover: configuration files
/// and constructor arguments that come from outside the simulator.
use thiserror::Error;

/// Result type alias for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Requested warp width exceeds the widest supported warp
    #[error("warp size {0} exceeds the maximum of {}", crate::warp::MAX_WARP_SIZE)]
    WarpSizeTooLarge(usize),

    /// A configuration field failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A block needs more warp slots than a single SM has
    #[error("a CTA of {warps} warps does not fit on an SM with {max} warp slots")]
    CtaTooLarge { warps: usize, max: usize },

    /// The decoder could not populate an instruction
    #[error("decode failed at pc=0x{pc:04x}: {reason}")]
    Decode { pc: u32, reason: String },

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
