//! GPU detection and diagnostics utilities
//!
//! Consolidates the device-probing logic the launcher needs: resolving the
//! `auto` device, counting visible GPUs, and capturing `nvidia-smi` state for
//! the failure path.

use crate::config::Device;
use crate::error::{LaunchError, Result};
use std::process::Command;

/// Information about a visible GPU
#[derive(Debug, Clone)]
pub struct GpuInfo {
    pub index: usize,
    pub name: String,
    pub memory_total_mib: u64,
    pub memory_used_mib: u64,
}

/// Utility for probing and resolving training devices
pub struct DeviceManager;

impl DeviceManager {
    /// Parse a device string (`auto`, `cpu`, `cuda`)
    ///
    /// # Examples
    /// ```rust
    /// use flowtrain::utils::DeviceManager;
    /// use flowtrain::Device;
    ///
    /// assert_eq!(DeviceManager::parse_device_string("cuda").unwrap(), Device::Cuda);
    /// assert!(DeviceManager::parse_device_string("tpu").is_err());
    /// ```
    pub fn parse_device_string(device_str: &str) -> Result<Device> {
        match device_str {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            _ => Err(LaunchError::invalid_config(format!(
                "Unknown device: {}. Supported: auto, cpu, cuda",
                device_str
            ))),
        }
    }

    /// Count GPUs visible to a spawned process
    ///
    /// `CUDA_VISIBLE_DEVICES` wins when set (an empty value means GPUs are
    /// masked off entirely); otherwise `nvidia-smi -L` is probed. Returns 0
    /// when no NVIDIA driver is present.
    #[must_use]
    pub fn detect_gpu_count() -> usize {
        if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
            return visible.split(',').filter(|s| !s.trim().is_empty()).count();
        }

        match Command::new("nvidia-smi").arg("-L").output() {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter(|line| line.starts_with("GPU "))
                .count(),
            _ => 0,
        }
    }

    /// Resolve the requested device and GPU count to concrete values
    ///
    /// `Auto` becomes `Cuda` when GPUs are visible and `Cpu` otherwise. A
    /// requested GPU count of 0 means "all visible GPUs".
    ///
    /// # Errors
    /// - `Cuda` requested (explicitly or via count) with no visible GPUs
    /// - More GPUs requested than visible
    pub fn resolve(device: Device, requested_gpus: usize) -> Result<(Device, usize)> {
        let visible = Self::detect_gpu_count();

        let device = match device {
            Device::Auto => {
                if visible > 0 {
                    Device::Cuda
                } else {
                    Device::Cpu
                }
            },
            other => other,
        };

        match device {
            Device::Cpu => Ok((Device::Cpu, 0)),
            Device::Cuda => {
                if visible == 0 {
                    return Err(LaunchError::invalid_config(
                        "CUDA requested but no NVIDIA GPUs are visible",
                    ));
                }
                let count = if requested_gpus == 0 { visible } else { requested_gpus };
                if count > visible {
                    return Err(LaunchError::invalid_config(format!(
                        "Requested {} GPUs but only {} are visible",
                        count, visible
                    )));
                }
                Ok((Device::Cuda, count))
            },
            Device::Auto => unreachable!("auto resolved above"),
        }
    }

    /// Query per-GPU details from `nvidia-smi`
    ///
    /// Returns an empty list when the driver is unavailable; a present driver
    /// with unparseable output is reported as an error.
    pub fn query_gpus() -> Result<Vec<GpuInfo>> {
        let output = match Command::new("nvidia-smi")
            .args([
                "--query-gpu=index,name,memory.total,memory.used",
                "--format=csv,noheader,nounits",
            ])
            .output()
        {
            Ok(output) if output.status.success() => output,
            _ => return Ok(Vec::new()),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_gpu_line)
            .collect()
    }

    /// Parse one CSV line of `nvidia-smi --query-gpu` output
    fn parse_gpu_line(line: &str) -> Result<GpuInfo> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(LaunchError::internal(format!(
                "Unexpected nvidia-smi output line: '{}'",
                line
            )));
        }

        let parse_u64 = |field: &str, what: &str| {
            field.parse::<u64>().map_err(|_| {
                LaunchError::internal(format!("Unparseable {} in nvidia-smi output: '{}'", what, field))
            })
        };

        Ok(GpuInfo {
            index: parse_u64(fields.first().copied().unwrap_or(""), "GPU index")? as usize,
            name: fields.get(1).copied().unwrap_or("").to_string(),
            memory_total_mib: parse_u64(fields.get(2).copied().unwrap_or(""), "total memory")?,
            memory_used_mib: parse_u64(fields.get(3).copied().unwrap_or(""), "used memory")?,
        })
    }

    /// Capture raw `nvidia-smi` output for post-failure diagnostics
    ///
    /// Never fails: when the driver is missing the returned string says so,
    /// which is itself the relevant diagnostic.
    #[must_use]
    pub fn diagnostics_dump() -> String {
        match Command::new("nvidia-smi").output() {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            },
            Ok(output) => format!(
                "nvidia-smi exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => format!("nvidia-smi unavailable: {}", e),
        }
    }
}
