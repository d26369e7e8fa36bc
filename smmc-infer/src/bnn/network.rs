use crate::error::{config_err, Result};

use candle_core::{Module, Tensor};
use candle_nn::Activation;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Architecture {
    /// d → h → 1
    TwoLayer,
    /// d → h → h → 1
    #[default]
    ThreeLayer,
}

/// Negative slope of the hidden activations
pub const LEAKY_SLOPE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub name: String,
    pub in_dim: usize,
    pub out_dim: usize,
    /// `None` on the output layer, which stays in logit space
    pub activation: Option<Activation>,
}

impl LayerSpec {
    pub fn weight_name(&self) -> String {
        format!("{}.weight", self.name)
    }

    pub fn bias_name(&self) -> String {
        format!("{}.bias", self.name)
    }
}

/// Fixed feed-forward network mapping scaled parameters to the logit of
/// the satisfaction probability. Holds no weights: every evaluation takes
/// a [`WeightBundle`].
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    input_dim: usize,
    hidden_dim: usize,
    architecture: Architecture,
    layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    pub fn new(input_dim: usize, hidden_dim: usize, architecture: Architecture) -> Self {
        let hidden = Some(Activation::LeakyRelu(LEAKY_SLOPE));
        let dims = match architecture {
            Architecture::TwoLayer => vec![(input_dim, hidden_dim), (hidden_dim, 1)],
            Architecture::ThreeLayer => vec![
                (input_dim, hidden_dim),
                (hidden_dim, hidden_dim),
                (hidden_dim, 1),
            ],
        };
        let depth = dims.len();
        let layers = dims
            .into_iter()
            .enumerate()
            .map(|(l, (in_dim, out_dim))| LayerSpec {
                name: format!("fc{}", l + 1),
                in_dim,
                out_dim,
                activation: if l + 1 < depth { hidden.clone() } else { None },
            })
            .collect();

        Self {
            input_dim,
            hidden_dim,
            architecture,
            layers,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Every weight tensor by name, in evaluation order
    pub fn param_shapes(&self) -> Vec<(String, Vec<usize>)> {
        self.layers
            .iter()
            .flat_map(|l| {
                [
                    (l.weight_name(), vec![l.out_dim, l.in_dim]),
                    (l.bias_name(), vec![l.out_dim]),
                ]
            })
            .collect()
    }

    pub fn num_weights(&self) -> usize {
        self.param_shapes()
            .iter()
            .map(|(_, s)| s.iter().product::<usize>())
            .sum()
    }

    /// Logits for every weight realisation in `weights`
    ///
    /// # Arguments
    /// * `x_nd` - scaled inputs
    ///
    /// # Returns
    /// shape (S, n)
    pub fn forward_logits(&self, weights: &WeightBundle, x_nd: &Tensor) -> Result<Tensor> {
        let (n, d) = x_nd.dims2()?;
        if d != self.input_dim {
            return Err(config_err!(
                "inputs have {} columns, the network takes {}",
                d,
                self.input_dim
            ));
        }
        let s = weights.num_samples();

        let mut h_snk = x_nd.unsqueeze(0)?.broadcast_as((s, n, d))?.contiguous()?;
        for layer in &self.layers {
            let w_soi = weights.get(&layer.weight_name())?;
            let b_so = weights.get(&layer.bias_name())?;
            h_snk = h_snk
                .matmul(&w_soi.transpose(1, 2)?.contiguous()?)?
                .broadcast_add(&b_so.unsqueeze(1)?)?;
            if let Some(act) = &layer.activation {
                h_snk = act.forward(&h_snk)?;
            }
        }
        Ok(h_snk.squeeze(2)?)
    }

    /// Probabilities `σ(logits)`, shape (S, n)
    pub fn forward(&self, weights: &WeightBundle, x_nd: &Tensor) -> Result<Tensor> {
        Ok(candle_nn::ops::sigmoid(&self.forward_logits(weights, x_nd)?)?)
    }
}

/// `S` realisations of every network tensor, each stored with a leading
/// sample axis: weights `(S, out, in)`, biases `(S, out)`.
#[derive(Debug, Clone)]
pub struct WeightBundle {
    num_samples: usize,
    tensors: BTreeMap<String, Tensor>,
}

impl WeightBundle {
    pub fn new(num_samples: usize) -> Self {
        Self {
            num_samples,
            tensors: BTreeMap::new(),
        }
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn insert(&mut self, name: &str, value: Tensor) -> Result<()> {
        if value.dim(0)? != self.num_samples {
            return Err(config_err!(
                "{} has {} samples, bundle holds {}",
                name,
                value.dim(0)?,
                self.num_samples
            ));
        }
        self.tensors.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| config_err!("no weights for {}", name))
    }
}
