use crate::error::{PipelineError, Result};
use candle_core::Device;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

pub mod decode;
pub mod text;

/// Which device a pipeline should run inference on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Run on CPU (default).
    #[default]
    Cpu,
    /// Run on the CUDA GPU with this index. Needs the `cuda` feature.
    Cuda(usize),
}

impl DeviceRequest {
    /// Resolve the request into an actual [`Device`].
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(i) => {
                // One device handle per GPU so bundles loaded by different pipelines
                // share a stream.
                static CUDA_DEVICE_CACHE: Lazy<Mutex<HashMap<usize, Device>>> =
                    Lazy::new(|| Mutex::new(HashMap::new()));

                let mut cache = CUDA_DEVICE_CACHE
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(dev) = cache.get(&i) {
                    return Ok(dev.clone());
                }

                let dev = Device::new_cuda(i).map_err(|e| {
                    PipelineError::Device(format!(
                        "Failed to init CUDA device {i}: {e}. Try CPU as fallback."
                    ))
                })?;
                cache.insert(i, dev.clone());
                Ok(dev)
            }
        }
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRequest::Cpu => write!(f, "cpu"),
            DeviceRequest::Cuda(i) => write!(f, "cuda:{i}"),
        }
    }
}

impl FromStr for DeviceRequest {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(DeviceRequest::Cpu),
            "cuda" | "gpu" => Ok(DeviceRequest::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(DeviceRequest::Cuda)
                .ok_or_else(|| {
                    PipelineError::config(
                        "device",
                        format!("expected `cpu`, `cuda` or `cuda:N`, got `{other}`"),
                    )
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_request_round_trips_through_display() {
        for request in [DeviceRequest::Cpu, DeviceRequest::Cuda(3)] {
            assert_eq!(request.to_string().parse::<DeviceRequest>().unwrap(), request);
        }
        assert_eq!("CUDA".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cuda(0));
        assert!("cuda:x".parse::<DeviceRequest>().is_err());
    }

    #[test]
    fn test_cpu_resolves() {
        assert!(DeviceRequest::Cpu.resolve().unwrap().is_cpu());
    }
}
