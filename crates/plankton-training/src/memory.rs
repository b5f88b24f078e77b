//! One-shot memory probe around a forward pass.
//!
//! The probe samples memory, runs the model on a synthetic batch of two
//! normally distributed images and samples again. Host memory is the
//! process resident set size from `/proc/self/status`; accelerator memory is
//! the device usage reported by `nvidia-smi`. Sampling failures never abort
//! a run, they only produce an `Unavailable` report.

use burn::tensor::{backend::Backend, Distribution, Tensor};
use plankton_core::{Device, Error, ImageSize, Result};
use std::fmt;
use tracing::{info, warn};

use crate::model::PlanktonModel;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Number of synthetic images pushed through the model
pub const PROBE_BATCH_SIZE: usize = 2;

/// Source of a memory reading in bytes
pub trait MemorySampler {
    /// Label for reports, `"CPU"` or `"GPU"`
    fn domain(&self) -> &'static str;

    /// Current usage in bytes
    fn sample(&self) -> Result<u64>;
}

/// Resident set size of this process
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRssSampler;

impl MemorySampler for HostRssSampler {
    fn domain(&self) -> &'static str {
        "CPU"
    }

    fn sample(&self) -> Result<u64> {
        let status = std::fs::read_to_string("/proc/self/status")
            .map_err(|e| Error::Device(format!("cannot read /proc/self/status: {e}")))?;
        parse_vm_rss(&status)
            .ok_or_else(|| Error::Device("VmRSS missing from /proc/self/status".to_string()))
    }
}

/// Used memory of one NVIDIA device as reported by `nvidia-smi`
///
/// `memory.used` covers the whole device, allocations of other processes
/// and CUDA contexts included, and is only reported in whole MiB. A delta
/// taken with this sampler is an upper bound on what the forward pass
/// allocated and cannot resolve changes below 1 MiB.
#[derive(Debug, Clone, Copy)]
pub struct NvidiaSmiSampler {
    pub index: usize,
}

impl MemorySampler for NvidiaSmiSampler {
    fn domain(&self) -> &'static str {
        "GPU"
    }

    fn sample(&self) -> Result<u64> {
        let output = std::process::Command::new("nvidia-smi")
            .args([
                "--query-gpu=memory.used",
                "--format=csv,noheader,nounits",
                "-i",
                &self.index.to_string(),
            ])
            .output()
            .map_err(|e| Error::Device(format!("failed to run nvidia-smi: {e}")))?;

        if !output.status.success() {
            return Err(Error::Device(format!(
                "nvidia-smi exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_nvidia_smi_used(&stdout).ok_or_else(|| {
            Error::Device(format!("unexpected nvidia-smi output: {}", stdout.trim()))
        })
    }
}

/// Sampler matching the memory domain of `device`
pub fn sampler_for(device: Device) -> Box<dyn MemorySampler> {
    match device {
        Device::Cpu => Box::new(HostRssSampler),
        Device::Gpu(index) => Box::new(NvidiaSmiSampler { index }),
    }
}

/// `VmRSS` from a `/proc/<pid>/status` dump, in bytes
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// First line of `--query-gpu=memory.used` output (MiB), in bytes
fn parse_nvidia_smi_used(stdout: &str) -> Option<u64> {
    let mib: u64 = stdout.lines().next()?.trim().parse().ok()?;
    Some(mib * 1024 * 1024)
}

/// Outcome of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Measured { before: u64, after: u64 },
    Unavailable(String),
}

/// Memory probe result tagged with its domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryReport {
    pub domain: &'static str,
    pub outcome: ProbeOutcome,
}

impl MemoryReport {
    /// Signed change in bytes, if both samples succeeded
    pub fn delta_bytes(&self) -> Option<i64> {
        match self.outcome {
            ProbeOutcome::Measured { before, after } => Some(after as i64 - before as i64),
            ProbeOutcome::Unavailable(_) => None,
        }
    }

    pub fn delta_mib(&self) -> Option<f64> {
        self.delta_bytes().map(|b| b as f64 / BYTES_PER_MIB)
    }

    /// Memory shrank while the probe held live tensors
    pub fn is_anomalous(&self) -> bool {
        self.delta_bytes().is_some_and(|d| d < 0)
    }

    /// Emit the report, as a warning unless it is a plain measurement.
    pub fn log(&self) {
        match self.outcome {
            ProbeOutcome::Measured { .. } if !self.is_anomalous() => info!("{self}"),
            _ => warn!("{self}"),
        }
    }
}

impl fmt::Display for MemoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ProbeOutcome::Unavailable(reason) => {
                write!(f, "{} memory probe unavailable: {}", self.domain, reason)
            }
            ProbeOutcome::Measured { .. } => {
                let mib = self.delta_mib().unwrap_or_default();
                write!(f, "{} Memory Used (MiB): {:.2}", self.domain, mib)?;
                if self.domain == "GPU" {
                    write!(f, " (device-wide, all processes)")?;
                }
                if self.is_anomalous() {
                    write!(f, " (anomalous: memory decreased during probe)")?;
                }
                Ok(())
            }
        }
    }
}

/// Run one forward pass on synthetic input and report the memory change.
pub fn probe_memory<B: Backend>(
    model: &PlanktonModel<B>,
    device: &B::Device,
    channels: usize,
    size: ImageSize,
    sampler: &dyn MemorySampler,
) -> MemoryReport {
    let domain = sampler.domain();
    let unavailable = |e: Error| MemoryReport {
        domain,
        outcome: ProbeOutcome::Unavailable(e.to_string()),
    };

    let before = match sampler.sample() {
        Ok(bytes) => bytes,
        Err(e) => return unavailable(e),
    };

    let input = Tensor::<B, 4>::random(
        [PROBE_BATCH_SIZE, channels, size.height, size.width],
        Distribution::Normal(0.0, 1.0),
        device,
    );
    let (output, latent) = model.forward(input);
    // Reading a value back waits for queued kernels to finish.
    let _ = latent.clone().sum().into_data();

    let after = match sampler.sample() {
        Ok(bytes) => bytes,
        Err(e) => return unavailable(e),
    };
    drop((output, latent));

    MemoryReport {
        domain,
        outcome: ProbeOutcome::Measured { before, after },
    }
}
