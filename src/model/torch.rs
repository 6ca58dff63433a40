use std::{
    fs,
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use parking_lot::Mutex;
use tch::{CModule, Device, IValue, Kind, Tensor, no_grad};

use crate::{
    error::BackendError,
    model::{ComputeDtype, DeviceKind, GenerationParams, LanguageModel, LoadPlan, ModelMetadata},
};

impl From<DeviceKind> for Device {
    fn from(device: DeviceKind) -> Self {
        match device {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda(idx) => Device::Cuda(idx),
        }
    }
}

impl From<ComputeDtype> for Kind {
    fn from(dtype: ComputeDtype) -> Self {
        match dtype {
            ComputeDtype::Float32 => Kind::Float,
            ComputeDtype::Float16 => Kind::Half,
        }
    }
}

/// TorchScript export of a causal LM returning logits of shape
/// `[batch, seq_len, vocab]` (alone or as the first tuple element).
pub struct TorchModel {
    model_id: String,
    plan: LoadPlan,
    size_bytes: u64,
    device: Device,
    module: Mutex<CModule>,
}

impl TorchModel {
    pub fn load(model_id: &str, module_path: &Path, plan: LoadPlan) -> Result<Self, BackendError> {
        let size_bytes = fs::metadata(module_path)
            .map_err(|e| BackendError::new(format!("{}: {e}", module_path.display())))?
            .len();
        let device = Device::from(plan.device());

        let mut module = CModule::load_on_device(module_path, device)?;
        if plan.compute_dtype() == ComputeDtype::Float16 {
            // CModule::to panics on failure instead of returning an error.
            panic::catch_unwind(AssertUnwindSafe(|| module.to(device, Kind::Half, false)))
                .map_err(|_| BackendError::new("converting module to float16 failed"))?;
        }
        module.set_eval();

        Ok(Self {
            model_id: model_id.to_string(),
            plan,
            size_bytes,
            device,
            module: Mutex::new(module),
        })
    }
}

impl LanguageModel for TorchModel {
    type Input = Tensor;

    fn place(&self, input_ids: &[u32]) -> Result<Tensor, BackendError> {
        let ids: Vec<i64> = input_ids.iter().map(|&id| i64::from(id)).collect();
        let tensor = Tensor::f_from_slice(&ids)?
            .f_reshape([1, ids.len() as i64])?
            .f_to(self.device)?;
        Ok(tensor)
    }

    fn generate(
        &self,
        input: Tensor,
        params: &GenerationParams,
    ) -> Result<Vec<Vec<u32>>, BackendError> {
        if params.do_sample && params.temperature <= 0.0 {
            return Err(BackendError::new(format!(
                "`temperature` has to be strictly positive when sampling, got {}",
                params.temperature
            )));
        }

        let sequence = no_grad(|| {
            let module = self.module.lock();
            let mut sequence = input;

            for _ in 0..params.max_new_tokens {
                let output = module.forward_is(&[IValue::Tensor(sequence.shallow_clone())])?;
                let logits = extract_logits(output)?;
                let last = logits.f_select(1, -1)?;
                let next = next_token(&last, params)?;

                let next_tensor = Tensor::f_from_slice(&[next])?
                    .f_reshape([1, 1])?
                    .f_to(self.device)?;
                sequence = Tensor::f_cat(&[&sequence, &next_tensor], 1)?;

                if params.eos_token_id.is_some_and(|eos| i64::from(eos) == next) {
                    break;
                }
            }

            Ok::<Tensor, BackendError>(sequence)
        })?;

        let flat = sequence.f_to(Device::Cpu)?.f_view([-1])?;
        let ids = token_ids(Vec::<i64>::try_from(&flat)?)?;
        Ok(vec![ids])
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            model_id: self.model_id.clone(),
            device: self.plan.device().to_string(),
            plan: self.plan.name().to_string(),
            dtype: self.plan.compute_dtype().as_str().to_string(),
            quantized: self.plan.quantized(),
            size_bytes: self.size_bytes,
        }
    }
}

fn extract_logits(output: IValue) -> Result<Tensor, BackendError> {
    match output {
        IValue::Tensor(t) => Ok(t),
        IValue::Tuple(tuple) => match tuple.into_iter().next() {
            Some(IValue::Tensor(t)) => Ok(t),
            _ => Err(BackendError::new("expected tensor as first tuple element")),
        },
        _ => Err(BackendError::new("unexpected model output format")),
    }
}

fn token_ids(ids: Vec<i64>) -> Result<Vec<u32>, BackendError> {
    ids.into_iter()
        .map(|id| {
            u32::try_from(id)
                .map_err(|_| BackendError::new(format!("model produced invalid token id {id}")))
        })
        .collect()
}

/// Greedy argmax, or multinomial sampling over temperature-scaled logits.
/// `logits` has shape `[1, vocab]`.
fn next_token(logits: &Tensor, params: &GenerationParams) -> Result<i64, BackendError> {
    let logits = logits.f_to_kind(Kind::Float)?;
    let token = if params.do_sample {
        logits
            .f_div_scalar(params.temperature)?
            .f_softmax(-1, Kind::Float)?
            .f_multinomial(1, false)?
            .f_view([-1])?
            .f_int64_value(&[0])?
    } else {
        logits.f_argmax(-1, false)?.f_view([-1])?.f_int64_value(&[0])?
    };
    Ok(token)
}
