use candle_core::{DType, Device, Result, Tensor};
use ndarray::prelude::*;

/// Move host-side `ndarray` data onto a device
pub trait ToTensor {
    fn to_tensor(&self, dtype: DType, device: &Device) -> Result<Tensor>;
}

impl ToTensor for Array2<f32> {
    fn to_tensor(&self, dtype: DType, device: &Device) -> Result<Tensor> {
        let data = self.iter().copied().collect::<Vec<_>>();
        Tensor::from_vec(data, self.dim(), device)?.to_dtype(dtype)
    }
}

impl ToTensor for Array1<f32> {
    fn to_tensor(&self, dtype: DType, device: &Device) -> Result<Tensor> {
        let data = self.iter().copied().collect::<Vec<_>>();
        Tensor::from_vec(data, self.len(), device)?.to_dtype(dtype)
    }
}

/// And back to the host as `f32`
pub trait ToArray {
    fn to_array1(&self) -> anyhow::Result<Array1<f32>>;
    fn to_array2(&self) -> anyhow::Result<Array2<f32>>;
}

impl ToArray for Tensor {
    fn to_array1(&self) -> anyhow::Result<Array1<f32>> {
        Ok(Array1::from_vec(self.to_dtype(DType::F32)?.to_vec1::<f32>()?))
    }

    fn to_array2(&self) -> anyhow::Result<Array2<f32>> {
        let (n, m) = self.dims2()?;
        let data = self
            .to_dtype(DType::F32)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        Ok(Array2::from_shape_vec((n, m), data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_both_ways() -> anyhow::Result<()> {
        let x = array![[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t = x.to_tensor(DType::F64, &Device::Cpu)?;
        assert_eq!(t.dims(), &[2, 3]);
        assert_eq!(t.to_vec2::<f64>()?[1][0], 4.0);
        assert_eq!(t.to_array2()?, x);

        let t_col = x.t().to_owned().to_tensor(DType::F32, &Device::Cpu)?;
        assert_eq!(t_col.to_vec2::<f32>()?[0], vec![1.0, 4.0]);
        Ok(())
    }
}
