//! Numerical backend selection.
//!
//! - [`device`]: compute device discovery and selection

pub mod device;

pub use device::{detect_devices, select_device, ComputeDevice, DeviceKind};
