pub mod callback;
pub mod config;
pub mod error;
pub mod executor;
pub mod gpu;
pub mod inst;
pub mod kernel;
pub mod memory;
pub mod metrics;
pub mod sm;
pub mod warp;

pub use error::{ModelError, Result};
