use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Cpu,
    Cuda(usize),
}

impl DeviceKind {
    pub fn is_accelerated(self) -> bool {
        matches!(self, DeviceKind::Cuda(_))
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => f.write_str("cpu"),
            DeviceKind::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComputeDtype {
    Float32,
    Float16,
}

impl ComputeDtype {
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeDtype::Float32 => "float32",
            ComputeDtype::Float16 => "float16",
        }
    }
}

/// How the model weights are brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPlan {
    /// 8-bit weights on the accelerator, half-precision compute.
    Int8 { device: DeviceKind },
    /// Full weights on the accelerator, half-precision compute.
    Fp16 { device: DeviceKind },
    /// Default precision on the CPU. Slow, and large models may not fit.
    Cpu,
}

impl LoadPlan {
    pub fn select(device: DeviceKind, int8_available: bool) -> Self {
        match device {
            DeviceKind::Cuda(_) if int8_available => LoadPlan::Int8 { device },
            DeviceKind::Cuda(_) => LoadPlan::Fp16 { device },
            DeviceKind::Cpu => LoadPlan::Cpu,
        }
    }

    pub fn device(self) -> DeviceKind {
        match self {
            LoadPlan::Int8 { device } | LoadPlan::Fp16 { device } => device,
            LoadPlan::Cpu => DeviceKind::Cpu,
        }
    }

    pub fn compute_dtype(self) -> ComputeDtype {
        match self {
            LoadPlan::Int8 { .. } | LoadPlan::Fp16 { .. } => ComputeDtype::Float16,
            LoadPlan::Cpu => ComputeDtype::Float32,
        }
    }

    pub fn quantized(self) -> bool {
        matches!(self, LoadPlan::Int8 { .. })
    }

    pub fn name(self) -> &'static str {
        match self {
            LoadPlan::Int8 { .. } => "int8",
            LoadPlan::Fp16 { .. } => "fp16",
            LoadPlan::Cpu => "cpu",
        }
    }
}
