//! On-disk layout of a trained model, all under one prefix:
//!
//! * `{prefix}.safetensors` - trained parameters by name
//! * `{prefix}.json` - how to rebuild the model around them
//! * `{prefix}.training_time.txt` - wall-clock training time

use crate::bnn::BnnConfig;
use crate::error::{config_err, Result};
use crate::pipeline::Method;
use crate::svgp::GpConfig;

use serde::{Deserialize, Serialize};
use smmc_data::common_io::{mkdir_parent, read_to_string, write_string};
use smmc_data::MinMaxScaler;
use std::time::Duration;

pub struct ArtifactPaths {
    pub params: String,
    pub meta: String,
    pub training_time: String,
}

impl ArtifactPaths {
    pub fn new(prefix: &str) -> Self {
        Self {
            params: format!("{}.safetensors", prefix),
            meta: format!("{}.json", prefix),
            training_time: format!("{}.training_time.txt", prefix),
        }
    }
}

/// Architecture-specific part of the metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelMeta {
    Gp {
        config: GpConfig,
        /// scaled inducing locations, one row each
        inducing_points: Vec<Vec<f32>>,
    },
    Bnn {
        config: BnnConfig,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub method: Method,
    pub input_dim: usize,
    pub n_trials: usize,
    pub scaler: MinMaxScaler,
    pub model: ModelMeta,
}

impl ArtifactMeta {
    pub fn write(&self, paths: &ArtifactPaths) -> Result<()> {
        mkdir_parent(&paths.meta)?;
        write_string(&serde_json::to_string_pretty(self)?, &paths.meta)?;
        Ok(())
    }

    pub fn read(paths: &ArtifactPaths) -> Result<Self> {
        let ret: Self = serde_json::from_str(&read_to_string(&paths.meta)?)?;
        if ret.scaler.dim() != ret.input_dim {
            return Err(config_err!(
                "{}: scaler has {} columns, input_dim is {}",
                paths.meta,
                ret.scaler.dim(),
                ret.input_dim
            ));
        }
        Ok(ret)
    }
}

pub fn write_training_time(paths: &ArtifactPaths, elapsed: Duration) -> Result<()> {
    mkdir_parent(&paths.training_time)?;
    write_string(
        &format!("{:.3}\n", elapsed.as_secs_f64()),
        &paths.training_time,
    )?;
    Ok(())
}

/// Seconds, as written by [`write_training_time`]
pub fn read_training_time(paths: &ArtifactPaths) -> Result<f64> {
    let text = read_to_string(&paths.training_time)?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| config_err!("{}: {}", paths.training_time, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_a_prefix() {
        let p = ArtifactPaths::new("out/model");
        assert_eq!(p.params, "out/model.safetensors");
        assert_eq!(p.meta, "out/model.json");
        assert_eq!(p.training_time, "out/model.training_time.txt");
    }

    #[test]
    fn training_time_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("nested").join("m");
        let paths = ArtifactPaths::new(&prefix.to_string_lossy());
        write_training_time(&paths, Duration::from_millis(12_345))?;
        approx::assert_abs_diff_eq!(read_training_time(&paths)?, 12.345, epsilon = 1e-9);
        Ok(())
    }
}
