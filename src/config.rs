/// Device configuration, loadable from JSON.
/// Presets mirror real parts; a JSON file overrides any field.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::warp::{MAX_WARP_SIZE, WARP_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub name: String,
    /// Number of SMs (cores) on the device
    pub num_sms: usize,
    /// Lanes per warp, at most 32
    pub warp_size: usize,
    /// Maximum concurrent warps per SM
    pub max_warps_per_sm: usize,
}

impl GpuConfig {
    /// H100 (Hopper, CC 9.0)
    pub fn h100() -> Self {
        GpuConfig {
            name: "H100".to_string(),
            num_sms: 132,
            warp_size: WARP_SIZE,
            max_warps_per_sm: 64,
        }
    }

    /// A100 (Ampere, CC 8.0)
    pub fn a100() -> Self {
        GpuConfig {
            name: "A100".to_string(),
            num_sms: 108,
            warp_size: WARP_SIZE,
            max_warps_per_sm: 64,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: GpuConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&data)?;
        tracing::info!(path = %path.as_ref().display(), name = %config.name, "loaded device config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.warp_size > MAX_WARP_SIZE {
            return Err(ModelError::WarpSizeTooLarge(self.warp_size));
        }
        if self.warp_size == 0 {
            return Err(ModelError::InvalidConfig("warp_size must be at least 1".into()));
        }
        if self.num_sms == 0 {
            return Err(ModelError::InvalidConfig("num_sms must be at least 1".into()));
        }
        if self.max_warps_per_sm == 0 {
            return Err(ModelError::InvalidConfig("max_warps_per_sm must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self::h100()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg = GpuConfig::from_json_str(r#"{ "num_sms": 4, "warp_size": 16 }"#).unwrap();
        assert_eq!(cfg.num_sms, 4);
        assert_eq!(cfg.warp_size, 16);
        assert_eq!(cfg.max_warps_per_sm, 64);
        assert_eq!(cfg.name, "H100");
    }

    #[test]
    fn test_rejects_wide_warp() {
        let err = GpuConfig::from_json_str(r#"{ "warp_size": 64 }"#).unwrap_err();
        assert!(matches!(err, ModelError::WarpSizeTooLarge(64)));
    }

    #[test]
    fn test_rejects_zero_sms() {
        let err = GpuConfig::from_json_str(r#"{ "num_sms": 0 }"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            GpuConfig::from_json_str("{ num_sms: }"),
            Err(ModelError::Json(_))
        ));
    }

    #[test]
    fn test_round_trip_file() {
        let path = std::env::temp_dir().join(format!("gpumodel_cfg_{}.json", std::process::id()));
        let cfg = GpuConfig { num_sms: 2, ..GpuConfig::a100() };
        std::fs::write(&path, serde_json::to_string(&cfg).unwrap()).unwrap();
        let loaded = GpuConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, cfg);
    }
}
