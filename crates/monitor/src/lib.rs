//! Resource monitor — RAM/swap/VRAM sampling, pressure classification,
//! and the VRAM leak watch that drives the process-wide degraded flag.

mod leak;
mod status;

pub use leak::LeakVerdict;
pub use status::{GpuProbe, GpuSample, PressureClass, ResourceMonitor, ResourceStatus};
