//! Compute device discovery.
//!
//! Fitting and simulation always run on the CPU through `ndarray`. With the
//! `cuda` feature the CUDA driver is queried for devices, so a run can report
//! which accelerator it would use and fall back cleanly when there is none.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu,
    Cuda,
}

/// Information about a single compute device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeDevice {
    /// Device index (0 for the host CPU).
    pub id: usize,

    /// Device name (e.g., "NVIDIA GeForce GTX 1070").
    pub name: String,

    pub kind: DeviceKind,

    /// Total device memory in bytes, when known.
    pub total_memory: Option<usize>,
}

impl ComputeDevice {
    pub fn cpu() -> Self {
        let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            id: 0,
            name: format!("host CPU ({threads} threads)"),
            kind: DeviceKind::Cpu,
            total_memory: None,
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.kind == DeviceKind::Cuda
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_memory {
            Some(bytes) => write!(f, "[{}] {} ({} MiB)", self.id, self.name, bytes / (1024 * 1024)),
            None => write!(f, "[{}] {}", self.id, self.name),
        }
    }
}

/// Detect all available GPU devices.
///
/// With the `cuda` feature enabled, uses the CUDA driver to enumerate devices.
/// Without it, returns an empty list (CPU-only mode).
pub fn detect_devices() -> Vec<ComputeDevice> {
    #[cfg(feature = "cuda")]
    {
        detect_devices_cuda()
    }

    #[cfg(not(feature = "cuda"))]
    {
        info!("CUDA not enabled, running in CPU-only mode");
        Vec::new()
    }
}

#[cfg(feature = "cuda")]
fn detect_devices_cuda() -> Vec<ComputeDevice> {
    use cudarc::driver::{result, CudaContext};

    let count = match CudaContext::device_count() {
        Ok(count) => count.max(0) as usize,
        Err(e) => {
            warn!(error = %e, "CUDA driver unavailable");
            return Vec::new();
        }
    };

    let mut devices = Vec::with_capacity(count);
    for id in 0..count {
        let ctx = match CudaContext::new(id) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(device = id, error = %e, "Failed to open CUDA device");
                continue;
            }
        };
        let name = ctx.name().unwrap_or_else(|_| format!("CUDA device {id}"));
        // SAFETY: the device handle comes from a live context.
        let total_memory = unsafe { result::device::total_mem(ctx.cu_device()) }.ok();
        devices.push(ComputeDevice {
            id,
            name,
            kind: DeviceKind::Cuda,
            total_memory,
        });
    }
    info!(count = devices.len(), "CUDA devices detected");
    devices
}

/// Pick the device to report for a run: the first GPU when one is wanted and
/// available, otherwise the host CPU.
pub fn select_device(prefer_gpu: bool) -> ComputeDevice {
    if !prefer_gpu {
        return ComputeDevice::cpu();
    }
    select_from(detect_devices())
}

fn select_from(devices: Vec<ComputeDevice>) -> ComputeDevice {
    match devices.into_iter().find(ComputeDevice::is_gpu) {
        Some(device) => device,
        None => {
            warn!("No GPU device available, falling back to CPU");
            ComputeDevice::cpu()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_selected_without_preference() {
        let device = select_device(false);
        assert_eq!(device.kind, DeviceKind::Cpu);
        assert!(!device.is_gpu());
    }

    #[test]
    fn test_fallback_to_cpu_when_no_gpu() {
        assert_eq!(select_from(Vec::new()).kind, DeviceKind::Cpu);
    }

    #[test]
    fn test_first_gpu_is_selected() {
        let gpus = vec![
            ComputeDevice {
                id: 0,
                name: "NVIDIA GeForce GTX 1070".to_string(),
                kind: DeviceKind::Cuda,
                total_memory: Some(8 * 1024 * 1024 * 1024),
            },
            ComputeDevice {
                id: 1,
                name: "NVIDIA Quadro M6000".to_string(),
                kind: DeviceKind::Cuda,
                total_memory: Some(24 * 1024 * 1024 * 1024),
            },
        ];
        let chosen = select_from(gpus);
        assert_eq!(chosen.id, 0);
        assert_eq!(chosen.to_string(), "[0] NVIDIA GeForce GTX 1070 (8192 MiB)");
    }
}
