use crate::error::Result;
use crate::model::{AudioDevice, DeviceId, DeviceMap, ProcessId, Volume};
use std::sync::Arc;

/// Trait for audio backends that can run in different modes
#[async_trait::async_trait]
pub trait AudioDevicePort: Send + Sync {
    /// Active render endpoints only. Empty map on failure.
    async fn list_output_devices(&self) -> DeviceMap;

    /// Default multimedia render endpoint
    async fn default_output_device(&self) -> Option<AudioDevice>;

    /// 0 when the device cannot be resolved
    async fn get_volume(&self, id: &DeviceId) -> Volume;

    /// Input is clamped to 0..=100 before applying
    async fn set_volume(&self, id: &DeviceId, percent: i32);

    /// Redirect the audio of `pid` to `id`. An error means "not applied yet".
    async fn assign_process_device(&self, pid: ProcessId, id: &DeviceId) -> Result<()>;

    async fn device_exists(&self, id: &DeviceId) -> bool;
}

/// Factory function to create an appropriate audio port based on the dry_run flag
pub fn create_audio_port(dry_run: bool) -> Result<Arc<dyn AudioDevicePort>> {
    if dry_run {
        return Ok(Arc::new(super::dry_run::DryRunAudioPort::new()));
    }

    #[cfg(windows)]
    {
        Ok(Arc::new(super::wasapi::WasapiAudioPort::new()))
    }

    #[cfg(not(windows))]
    {
        Err(crate::router_error!(
            service_unavailable,
            "аудио-бэкенд доступен только в Windows, используйте --dry-run"
        ))
    }
}
