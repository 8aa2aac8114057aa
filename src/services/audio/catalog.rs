use crate::debug_if_enabled;
use crate::model::{DeviceId, DeviceMap};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::r#trait::AudioDevicePort;

/// Снимок "имя -> id" живых устройств с коротким TTL.
///
/// Перечисление устройств на каждом тике дорогое, поэтому цикл маршрутизации
/// читает устройства через каталог. TTL 0 означает перечисление при каждом запросе.
pub struct DeviceCatalog {
    port: Arc<dyn AudioDevicePort>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

struct Snapshot {
    taken_at: Instant,
    devices: DeviceMap,
}

impl DeviceCatalog {
    pub fn new(port: Arc<dyn AudioDevicePort>, ttl: Duration) -> Self {
        Self {
            port,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    pub fn port(&self) -> &Arc<dyn AudioDevicePort> {
        &self.port
    }

    /// Кэшированный снимок, если он ещё свежий, иначе повторное перечисление
    pub async fn devices(&self) -> DeviceMap {
        let cached = self
            .snapshot
            .read()
            .as_ref()
            .filter(|snapshot| snapshot.taken_at.elapsed() < self.ttl)
            .map(|snapshot| snapshot.devices.clone());

        match cached {
            Some(devices) => devices,
            None => self.refresh().await,
        }
    }

    /// Принудительное перечисление с обновлением снимка
    pub async fn refresh(&self) -> DeviceMap {
        let devices = self.port.list_output_devices().await;
        debug_if_enabled!("Каталог устройств обновлён: {} устройств", devices.len());

        *self.snapshot.write() = Some(Snapshot {
            taken_at: Instant::now(),
            devices: devices.clone(),
        });
        devices
    }

    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
    }

    pub async fn resolve(&self, name: &str) -> Option<DeviceId> {
        self.devices().await.get(name).cloned()
    }
}
