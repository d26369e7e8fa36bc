use crate::error::{config_err, Result};

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Init, VarBuilder, VarMap};
use std::path::Path;

/// Named trainable tensors of one model.
///
/// Built by model construction and handed explicitly to the optimizer
/// and to save/load. Every handle returned by [`ParamStore::register`]
/// shares storage with the stored variable, so optimizer steps and
/// loads are visible through it.
pub struct ParamStore {
    varmap: VarMap,
    dtype: DType,
    device: Device,
}

impl ParamStore {
    pub fn new(dtype: DType, device: Device) -> Self {
        Self {
            varmap: VarMap::new(),
            dtype,
            device,
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Register `name` with the initial value `init` and return the
    /// tracked tensor
    pub fn register(&mut self, name: &str, init: &Tensor) -> Result<Tensor> {
        let init = init.to_dtype(self.dtype)?.to_device(&self.device)?;
        let vb = VarBuilder::from_varmap(&self.varmap, self.dtype, &self.device);
        let ret = vb.get_with_hints(init.dims().to_vec(), name, Init::Const(0.))?;
        self.varmap.set_one(name, &init)?;
        Ok(ret)
    }

    pub fn get(&self, name: &str) -> Result<Tensor> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| config_err!("parameter store lock poisoned"))?;
        data.get(name)
            .map(|v| v.as_tensor().clone())
            .ok_or_else(|| config_err!("no parameter named {}", name))
    }

    pub fn names(&self) -> Result<Vec<String>> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| config_err!("parameter store lock poisoned"))?;
        let mut ret = data.keys().cloned().collect::<Vec<_>>();
        ret.sort();
        Ok(ret)
    }

    pub fn all_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn num_parameters(&self) -> usize {
        self.all_vars().iter().map(|v| v.elem_count()).sum()
    }

    /// safetensors, one entry per registered name
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Ok(self.varmap.save(path)?)
    }

    /// Overwrite the registered variables in place; every name must
    /// already be registered with a matching shape.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        Ok(self.varmap.load(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_track_updates_and_loads() -> Result<()> {
        let dev = Device::Cpu;
        let mut store = ParamStore::new(DType::F32, dev.clone());
        let w = store.register("w", &Tensor::new(&[1.0f32, 2.0], &dev)?)?;
        assert_eq!(w.to_vec1::<f32>()?, vec![1.0, 2.0]);
        assert_eq!(store.names()?, vec!["w".to_string()]);
        assert_eq!(store.num_parameters(), 2);

        let dir = tempfile::tempdir()?;
        let file = dir.path().join("p.safetensors");
        store.save(&file)?;

        for v in store.all_vars() {
            v.set(&Tensor::new(&[5.0f32, 6.0], &dev)?)?;
        }
        assert_eq!(w.to_vec1::<f32>()?, vec![5.0, 6.0]);

        store.load(&file)?;
        assert_eq!(w.to_vec1::<f32>()?, vec![1.0, 2.0]);
        assert_eq!(store.get("w")?.to_vec1::<f32>()?, vec![1.0, 2.0]);
        Ok(())
    }
}
