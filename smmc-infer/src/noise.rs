use candle_core::{DType, Device, Result, Shape, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Seeded source of every random draw made during training and
/// prediction. Two sources built from the same seed produce the same
/// tensors in the same order.
pub struct NoiseSource {
    rng: StdRng,
}

impl NoiseSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `N(0, 1)` tensor of the given shape
    pub fn standard_normal<S: Into<Shape>>(
        &mut self,
        shape: S,
        dtype: DType,
        device: &Device,
    ) -> Result<Tensor> {
        let shape: Shape = shape.into();
        let data = (0..shape.elem_count())
            .map(|_| StandardNormal.sample(&mut self.rng))
            .collect::<Vec<f64>>();
        Tensor::from_vec(data, shape, device)?.to_dtype(dtype)
    }

    /// A fresh random permutation of `0..n`
    pub fn permutation(&mut self, n: usize) -> Vec<u32> {
        let mut ret = (0..n as u32).collect::<Vec<_>>();
        ret.shuffle(&mut self.rng);
        ret
    }
}
