// device.rs - Compute device selection for the embedding model.
//
// The device is a configuration value resolved once at init: a preference
// (auto / cpu / accelerator) combined with a capability check. Accelerator
// back-ends only exist when candle is built with the `cuda` or `metal` feature.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use candle_core::Device;

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Accelerator when one is detected, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    /// Accelerator or fail.
    Accelerator,
}

impl FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "accelerator" | "gpu" | "cuda" | "metal" => Ok(Self::Accelerator),
            other => bail!("unknown device preference: {other} (expected auto, cpu or accelerator)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    Cuda,
    Metal,
}

/// The device the model is actually bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelection {
    Accelerator(Accelerator),
    Cpu,
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accelerator(Accelerator::Cuda) => f.write_str("cuda"),
            Self::Accelerator(Accelerator::Metal) => f.write_str("metal"),
            Self::Cpu => f.write_str("cpu"),
        }
    }
}

/// Ask candle which accelerator, if any, this build can drive. CUDA wins over Metal.
pub fn detect_accelerator() -> Option<Accelerator> {
    if candle_core::utils::cuda_is_available() {
        Some(Accelerator::Cuda)
    } else if candle_core::utils::metal_is_available() {
        Some(Accelerator::Metal)
    } else {
        None
    }
}

/// Combine a preference with the detection result.
pub fn select_device(pref: DevicePreference, detected: Option<Accelerator>) -> anyhow::Result<DeviceSelection> {
    match (pref, detected) {
        (DevicePreference::Cpu, _) => Ok(DeviceSelection::Cpu),
        (DevicePreference::Auto, Some(acc)) | (DevicePreference::Accelerator, Some(acc)) => {
            Ok(DeviceSelection::Accelerator(acc))
        }
        (DevicePreference::Auto, None) => Ok(DeviceSelection::Cpu),
        (DevicePreference::Accelerator, None) => {
            bail!("accelerator requested but none is available (build with --features cuda or metal)")
        }
    }
}

impl DeviceSelection {
    pub fn to_device(self) -> anyhow::Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Accelerator(Accelerator::Cuda) => Device::new_cuda(0).context("open CUDA device 0"),
            Self::Accelerator(Accelerator::Metal) => Device::new_metal(0).context("open Metal device 0"),
        }
    }
}

/// Detect, select and open the device.
///
/// Under `Auto`, an accelerator that was detected but that fails to open
/// falls back to CPU with a warning. An explicit `Accelerator` preference does not.
pub fn resolve_device(pref: DevicePreference) -> anyhow::Result<(DeviceSelection, Device)> {
    let detected = detect_accelerator();
    let selection = select_device(pref, detected)?;
    log::info!(
        "Device selection: preference={:?}, detected={:?}, selected={}",
        pref,
        detected,
        selection
    );

    match selection.to_device() {
        Ok(device) => Ok((selection, device)),
        Err(e) if pref == DevicePreference::Auto && selection != DeviceSelection::Cpu => {
            log::warn!("Failed to open {} device, falling back to CPU: {:?}", selection, e);
            Ok((DeviceSelection::Cpu, Device::Cpu))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_without_accelerator_falls_back_to_cpu() {
        let sel = select_device(DevicePreference::Auto, None).unwrap();
        assert_eq!(sel, DeviceSelection::Cpu);
    }

    #[test]
    fn test_auto_prefers_detected_accelerator() {
        let sel = select_device(DevicePreference::Auto, Some(Accelerator::Cuda)).unwrap();
        assert_eq!(sel, DeviceSelection::Accelerator(Accelerator::Cuda));
    }

    #[test]
    fn test_cpu_preference_ignores_accelerator() {
        let sel = select_device(DevicePreference::Cpu, Some(Accelerator::Metal)).unwrap();
        assert_eq!(sel, DeviceSelection::Cpu);
    }

    #[test]
    fn test_forced_accelerator_without_one_is_an_error() {
        assert!(select_device(DevicePreference::Accelerator, None).is_err());
    }

    #[test]
    fn test_parse_preference() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!(" CPU ".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("cuda".parse::<DevicePreference>().unwrap(), DevicePreference::Accelerator);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_selection_always_opens() {
        let (sel, device) = resolve_device(DevicePreference::Cpu).unwrap();
        assert_eq!(sel, DeviceSelection::Cpu);
        assert!(device.is_cpu());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(DeviceSelection::Cpu.to_string(), "cpu");
        assert_eq!(DeviceSelection::Accelerator(Accelerator::Cuda).to_string(), "cuda");
        assert_eq!(DeviceSelection::Accelerator(Accelerator::Metal).to_string(), "metal");
    }
}
