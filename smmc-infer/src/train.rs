use crate::error::{numeric_err, Result};
use crate::noise::NoiseSource;
use crate::params::ParamStore;

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use serde::{Deserialize, Serialize};

/// Loss is reported every this many epochs
pub const LOG_EVERY: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub num_epochs: usize,
    /// `None` trains on the full set every epoch
    pub batch_size: Option<usize>,
    pub seed: u64,
    pub verbose: bool,
    pub show_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            num_epochs: 1000,
            batch_size: None,
            seed: 0,
            verbose: false,
            show_progress: true,
        }
    }
}

/// Row indexes of one epoch, split into minibatches
pub struct Minibatches {
    pub chunks: Vec<Vec<u32>>,
}

impl Minibatches {
    /// Full batch in order, or a fresh seeded permutation cut into
    /// `batch_size` chunks (the last one may be shorter)
    pub fn shuffle(n: usize, batch_size: Option<usize>, noise: &mut NoiseSource) -> Self {
        match batch_size {
            Some(b) if b > 0 && b < n => {
                let perm = noise.permutation(n);
                Self {
                    chunks: perm.chunks(b).map(|c| c.to_vec()).collect(),
                }
            }
            _ => Self {
                chunks: vec![(0..n as u32).collect()],
            },
        }
    }

    pub fn num_minibatch(&self) -> usize {
        self.chunks.len()
    }

    pub fn index_tensor(&self, b: usize, device: &Device) -> Result<Tensor> {
        let idx = &self.chunks[b];
        Ok(Tensor::from_slice(idx.as_slice(), idx.len(), device)?)
    }
}

/// Adam with a fixed learning rate and no weight decay
pub fn adam(store: &ParamStore, learning_rate: f64) -> Result<AdamW> {
    Ok(AdamW::new(
        store.all_vars(),
        ParamsAdamW {
            lr: learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        },
    )?)
}

/// Run `num_epochs` of minibatch gradient steps on every variable in
/// `store`.
///
/// # Arguments
/// * `n` - number of training rows
/// * `loss_fn` - loss on a minibatch of row indexes, scalar
///
/// # Returns
/// the mean loss of each epoch
pub fn optimize<F>(
    store: &ParamStore,
    n: usize,
    train_config: &TrainConfig,
    noise: &mut NoiseSource,
    mut loss_fn: F,
) -> Result<Vec<f32>>
where
    F: FnMut(&Tensor, &mut NoiseSource) -> Result<Tensor>,
{
    let mut opt = adam(store, train_config.learning_rate)?;

    let pb = ProgressBar::new(train_config.num_epochs as u64);
    if !train_config.show_progress || train_config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let mut loss_trace = Vec::with_capacity(train_config.num_epochs);

    for epoch in 0..train_config.num_epochs {
        let batches = Minibatches::shuffle(n, train_config.batch_size, noise);
        let mut loss_tot = 0f32;

        for b in 0..batches.num_minibatch() {
            let idx = batches.index_tensor(b, store.device())?;
            let loss = loss_fn(&idx, noise)?;
            let loss_val = loss.to_dtype(DType::F32)?.to_scalar::<f32>()?;
            if !loss_val.is_finite() {
                return Err(numeric_err!("loss is {} at epoch {}", loss_val, epoch + 1));
            }
            opt.backward_step(&loss)?;
            loss_tot += loss_val;
        }

        pb.inc(1);
        loss_trace.push(loss_tot / batches.num_minibatch() as f32);

        if (epoch + 1) % LOG_EVERY == 0 || epoch + 1 == train_config.num_epochs {
            info!(
                "[{}/{}] loss: {}",
                epoch + 1,
                train_config.num_epochs,
                loss_trace.last().copied().unwrap_or(f32::NAN)
            );
        }
    }
    pb.finish_and_clear();
    Ok(loss_trace)
}
