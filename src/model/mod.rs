pub mod device;
pub mod display;
pub mod mapping;

pub use device::{AudioDevice, DeviceId, DeviceMap, DeviceState, Volume};
pub use display::{screen_name_from_device, Display, ForegroundWindow, Rect};
pub use mapping::Mapping;

/// Идентификатор процесса ОС
pub type ProcessId = u32;
