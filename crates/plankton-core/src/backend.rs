//! Compute device selection.
//!
//! The Burn backend itself is chosen at compile time by the binary. This
//! module decides which device a run should use and detects whether an
//! NVIDIA accelerator is present.

use crate::config::DeviceConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Device type for backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Device {
    /// CPU backend
    Cpu,
    /// GPU backend with its ordinal
    Gpu(usize),
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Gpu(id) => write!(f, "GPU:{}", id),
        }
    }
}

/// Resolve the device for a run.
///
/// A GPU is used only when the config allows it, the binary was built with
/// an accelerator backend and a GPU is detected. Otherwise the run falls back
/// to the CPU with a warning.
pub fn resolve_device(config: &DeviceConfig, accelerator_compiled: bool) -> Device {
    resolve_with(config, accelerator_compiled, is_gpu_available())
}

fn resolve_with(config: &DeviceConfig, accelerator_compiled: bool, gpu_present: bool) -> Device {
    if config.cpu {
        info!("CPU forced by configuration");
        return Device::Cpu;
    }
    if !accelerator_compiled {
        if gpu_present {
            warn!("GPU detected but this binary was built without the `cuda` feature, using CPU");
        }
        return Device::Cpu;
    }
    if !gpu_present {
        warn!("GPU requested but not available, falling back to CPU");
        return Device::Cpu;
    }
    Device::Gpu(config.gpu_index)
}

/// Check if an NVIDIA GPU is visible to this process
pub fn is_gpu_available() -> bool {
    has_nvidia_gpu()
}

fn has_nvidia_gpu() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/proc/driver/nvidia/version").exists()
            || std::path::Path::new("/dev/nvidia0").exists()
            || nvidia_smi_succeeds("nvidia-smi")
    }

    #[cfg(target_os = "windows")]
    {
        nvidia_smi_succeeds("nvidia-smi.exe")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        false
    }
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
fn nvidia_smi_succeeds(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("-L")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
