use crate::error::{RouterError, Result};
use crate::model::{AudioDevice, DeviceId, DeviceMap, ProcessId, Volume};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use super::r#trait::AudioDevicePort;

/// Эмуляция аудиоподсистемы в памяти: для --dry-run и для тестов
pub struct DryRunAudioPort {
    state: RwLock<DryRunAudioState>,
}

#[derive(Default)]
struct DryRunAudioState {
    devices: Vec<AudioDevice>,
    default_device: Option<DeviceId>,
    volumes: HashMap<DeviceId, Volume>,
    assignments: Vec<(ProcessId, DeviceId)>,
    failing_pids: HashSet<ProcessId>,
    enumerations: usize,
}

impl Default for DryRunAudioPort {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunAudioPort {
    pub fn new() -> Self {
        info!("Инициализация DryRunAudioPort");
        Self::with_devices([
            ("Speakers (Dry Run)", "{0.0.0.00000000}.{dry-run-speakers}"),
            ("Headphones (Dry Run)", "{0.0.0.00000000}.{dry-run-headphones}"),
        ])
    }

    /// Набор устройств (имя, id). Первое становится устройством по умолчанию.
    pub fn with_devices<'a, I>(devices: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let devices: Vec<AudioDevice> = devices
            .into_iter()
            .map(|(name, id)| AudioDevice::active(name, id))
            .collect();

        let volumes = devices
            .iter()
            .map(|device| (device.id.clone(), Volume::clamped(50)))
            .collect();

        Self {
            state: RwLock::new(DryRunAudioState {
                default_device: devices.first().map(|device| device.id.clone()),
                devices,
                volumes,
                ..Default::default()
            }),
        }
    }

    pub fn add_device(&self, name: &str, id: &str) {
        let mut state = self.state.write();
        let device = AudioDevice::active(name, id);
        state.volumes.insert(device.id.clone(), Volume::clamped(50));
        state.devices.push(device);
    }

    /// Эмулирует отключение устройства
    pub fn remove_device(&self, name: &str) {
        let mut state = self.state.write();
        state.devices.retain(|device| device.name != name);
    }

    pub fn fail_assignments_for(&self, pid: ProcessId) {
        self.state.write().failing_pids.insert(pid);
    }

    pub fn clear_failures(&self) {
        self.state.write().failing_pids.clear();
    }

    /// Все успешные и неуспешные попытки назначения в порядке вызова
    pub fn assignments(&self) -> Vec<(ProcessId, DeviceId)> {
        self.state.read().assignments.clone()
    }

    pub fn enumeration_count(&self) -> usize {
        self.state.read().enumerations
    }
}

#[async_trait::async_trait]
impl AudioDevicePort for DryRunAudioPort {
    async fn list_output_devices(&self) -> DeviceMap {
        let mut state = self.state.write();
        state.enumerations += 1;
        state
            .devices
            .iter()
            .filter(|device| device.is_active())
            .map(|device| (device.name.clone(), device.id.clone()))
            .collect()
    }

    async fn default_output_device(&self) -> Option<AudioDevice> {
        let state = self.state.read();
        let default_id = state.default_device.as_ref()?;
        state
            .devices
            .iter()
            .find(|device| &device.id == default_id)
            .cloned()
    }

    async fn get_volume(&self, id: &DeviceId) -> Volume {
        let state = self.state.read();
        if !state.devices.iter().any(|device| &device.id == id) {
            warn!("[DRY RUN] Устройство {} не найдено, громкость 0", id);
            return Volume::MIN;
        }
        state.volumes.get(id).copied().unwrap_or_default()
    }

    async fn set_volume(&self, id: &DeviceId, percent: i32) {
        let volume = Volume::clamped(percent);
        let mut state = self.state.write();
        if !state.devices.iter().any(|device| &device.id == id) {
            warn!("[DRY RUN] Устройство {} не найдено, громкость не изменена", id);
            return;
        }
        info!("[DRY RUN] Громкость {} -> {}", id, volume);
        state.volumes.insert(id.clone(), volume);
    }

    async fn assign_process_device(&self, pid: ProcessId, id: &DeviceId) -> Result<()> {
        let mut state = self.state.write();
        state.assignments.push((pid, id.clone()));

        if state.failing_pids.contains(&pid) {
            return Err(RouterError::assign_failed(
                pid,
                "у процесса нет аудиосессии (эмуляция)",
            ));
        }
        if !state.devices.iter().any(|device| &device.id == id) {
            return RouterError::device_not_found(id.to_string());
        }

        info!("[DRY RUN] PID {} -> устройство {}", pid, id);
        Ok(())
    }

    async fn device_exists(&self, id: &DeviceId) -> bool {
        self.state.read().devices.iter().any(|device| &device.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port() -> DryRunAudioPort {
        DryRunAudioPort::with_devices([("Speakers", "dev-A"), ("Headphones", "dev-B")])
    }

    #[tokio::test]
    async fn test_set_volume_is_clamped() {
        let port = port();
        let id = DeviceId::from("dev-A");

        port.set_volume(&id, -10).await;
        assert_eq!(port.get_volume(&id).await, Volume::clamped(0));

        port.set_volume(&id, 150).await;
        assert_eq!(port.get_volume(&id).await, Volume::clamped(100));
    }

    #[tokio::test]
    async fn test_unknown_device_is_tolerated() {
        let port = port();
        let missing = DeviceId::from("dev-missing");

        assert_eq!(port.get_volume(&missing).await, Volume::MIN);
        port.set_volume(&missing, 30).await;
        assert!(!port.device_exists(&missing).await);
        assert!(port.assign_process_device(1, &missing).await.is_err());
    }

    #[tokio::test]
    async fn test_default_and_enumeration() {
        let port = port();

        let default = port.default_output_device().await.unwrap();
        assert_eq!(default.name, "Speakers");

        port.remove_device("Speakers");
        assert!(port.default_output_device().await.is_none());

        let devices = port.list_output_devices().await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices.get("Headphones"), Some(&DeviceId::from("dev-B")));
    }

    #[tokio::test]
    async fn test_injected_assignment_failure() {
        let port = port();
        let id = DeviceId::from("dev-A");
        port.fail_assignments_for(7);

        assert!(port.assign_process_device(7, &id).await.is_err());
        assert!(port.assign_process_device(8, &id).await.is_ok());
        assert_eq!(port.assignments().len(), 2);

        port.clear_failures();
        assert!(port.assign_process_device(7, &id).await.is_ok());
    }
}
