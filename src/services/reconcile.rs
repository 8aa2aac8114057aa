use crate::debug_if_enabled;
use crate::model::{DeviceId, DeviceMap, Mapping, ProcessId};
use crate::services::audio::{AudioDevicePort, DeviceCatalog};
use crate::services::display::DisplayPort;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Последнее успешно применённое устройство для каждого PID.
///
/// Запись появляется только после успешного вызова назначения. Подтверждения
/// от ОС нет, поэтому кэш отражает отправленные команды, а не фактическое состояние.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationCache {
    entries: HashMap<ProcessId, DeviceId>,
}

impl ReconciliationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pid: ProcessId) -> Option<&DeviceId> {
        self.entries.get(&pid)
    }

    pub fn record(&mut self, pid: ProcessId, device: DeviceId) {
        self.entries.insert(pid, device);
    }

    pub fn forget(&mut self, pid: ProcessId) -> Option<DeviceId> {
        self.entries.remove(&pid)
    }

    /// Удаляет записи процессов, которых больше нет. Возвращает число удалённых.
    pub fn retain_pids(&mut self, alive: &HashSet<ProcessId>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|pid, _| alive.contains(pid));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcessId, &DeviceId)> {
        self.entries.iter().map(|(pid, id)| (*pid, id))
    }
}

/// Целевое устройство для каждого процесса с видимым окном на назначенном экране.
/// Процессы на экранах без маппинга или с отсутствующим устройством не попадают в результат.
pub fn resolve_targets(
    owners: &HashMap<ProcessId, String>,
    devices: &DeviceMap,
    mapping: &Mapping,
) -> HashMap<ProcessId, DeviceId> {
    owners
        .iter()
        .filter_map(|(pid, display)| {
            let device_name = mapping.device_for(display)?;
            let id = devices.get(device_name)?;
            Some((*pid, id.clone()))
        })
        .collect()
}

pub async fn resolve_all(
    display: &dyn DisplayPort,
    catalog: &DeviceCatalog,
    mapping: &Mapping,
) -> HashMap<ProcessId, DeviceId> {
    let owners = display.all_visible_window_owners().await;
    let devices = catalog.devices().await;
    resolve_targets(&owners, &devices, mapping)
}

/// Назначает устройства только тем PID, у которых цель изменилась.
///
/// Результат: неизменившиеся и успешно применённые записи из `new`.
/// Неудачные попытки не попадают в кэш и будут повторены.
pub async fn apply_delta(
    audio: &dyn AudioDevicePort,
    old: &ReconciliationCache,
    new: HashMap<ProcessId, DeviceId>,
) -> ReconciliationCache {
    let mut updated = ReconciliationCache::new();
    let (mut applied, mut unchanged, mut failed) = (0usize, 0usize, 0usize);

    for (pid, device) in new {
        if old.get(pid) == Some(&device) {
            unchanged += 1;
            updated.record(pid, device);
            continue;
        }

        match audio.assign_process_device(pid, &device).await {
            Ok(()) => {
                debug_if_enabled!("PID {} -> {}", pid, device);
                applied += 1;
                updated.record(pid, device);
            }
            Err(e) => {
                warn!("Не удалось изменить аудиоустройство для PID {}: {}", pid, e);
                failed += 1;
            }
        }
    }

    info!(
        "Массовое согласование: применено {}, без изменений {}, ошибок {}",
        applied, unchanged, failed
    );
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::audio::DryRunAudioPort;
    use crate::services::display::DryRunDisplayPort;
    use std::sync::Arc;
    use std::time::Duration;

    fn devices() -> DeviceMap {
        [("Speakers", "dev-A"), ("Headphones", "dev-B")]
            .into_iter()
            .map(|(name, id)| (name.to_string(), DeviceId::from(id)))
            .collect()
    }

    fn targets(pairs: &[(ProcessId, &str)]) -> HashMap<ProcessId, DeviceId> {
        pairs.iter().map(|(pid, id)| (*pid, DeviceId::from(*id))).collect()
    }

    fn audio() -> DryRunAudioPort {
        DryRunAudioPort::with_devices([("Speakers", "dev-A"), ("Headphones", "dev-B")])
    }

    #[test]
    fn test_resolve_targets_skips_unmapped_displays() {
        let owners: HashMap<ProcessId, String> = [
            (1, "Screen1"),
            (2, "Screen2"),
            (3, "Screen3"),
            (4, "Screen4"),
        ]
        .into_iter()
        .map(|(pid, display)| (pid, display.to_string()))
        .collect();

        let mapping: Mapping = [
            ("Screen1", "Speakers"),
            ("Screen2", "Headphones"),
            ("Screen3", "Unplugged DAC"),
            ("Screen4", ""),
        ]
        .into_iter()
        .collect();

        let resolved = resolve_targets(&owners, &devices(), &mapping);
        assert_eq!(resolved, targets(&[(1, "dev-A"), (2, "dev-B")]));
    }

    #[tokio::test]
    async fn test_first_resolution_applies_every_entry_once() {
        let audio = audio();
        let new = targets(&[(1, "dev-A"), (2, "dev-B"), (3, "dev-A")]);

        let cache = apply_delta(&audio, &ReconciliationCache::new(), new).await;

        let mut calls = audio.assignments();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                (1, DeviceId::from("dev-A")),
                (2, DeviceId::from("dev-B")),
                (3, DeviceId::from("dev-A")),
            ]
        );
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_unchanged_targets_make_no_calls() {
        let audio = audio();
        let old = apply_delta(&audio, &ReconciliationCache::new(), targets(&[(1, "dev-A"), (2, "dev-B")])).await;
        assert_eq!(audio.assignments().len(), 2);

        let cache = apply_delta(&audio, &old, targets(&[(1, "dev-A"), (2, "dev-A")])).await;

        let calls = audio.assignments();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], (2, DeviceId::from("dev-A")));
        assert_eq!(cache.get(1), Some(&DeviceId::from("dev-A")));
        assert_eq!(cache.get(2), Some(&DeviceId::from("dev-A")));
    }

    #[tokio::test]
    async fn test_failed_apply_is_excluded_and_retried() {
        let audio = audio();
        audio.fail_assignments_for(2);

        let cache = apply_delta(&audio, &ReconciliationCache::new(), targets(&[(1, "dev-A"), (2, "dev-B")])).await;
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.len(), 1);

        audio.clear_failures();
        let cache = apply_delta(&audio, &cache, targets(&[(1, "dev-A"), (2, "dev-B")])).await;
        assert_eq!(cache.get(2), Some(&DeviceId::from("dev-B")));
        // PID 1 повторно не назначался
        assert_eq!(audio.assignments().iter().filter(|(pid, _)| *pid == 1).count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_all_uses_live_state() {
        let audio = Arc::new(audio());
        let catalog = DeviceCatalog::new(audio.clone(), Duration::ZERO);
        let display = DryRunDisplayPort::scripted(&["Screen1", "Screen2"]);
        display.add_window(10, "Player", "Screen1");
        display.add_window(11, "Chat", "Screen2");

        let mapping: Mapping = [("Screen1", "Speakers")].into_iter().collect();
        let resolved = resolve_all(&display, &catalog, &mapping).await;

        assert_eq!(resolved, targets(&[(10, "dev-A")]));
    }

    #[test]
    fn test_retain_pids() {
        let mut cache = ReconciliationCache::new();
        cache.record(1, DeviceId::from("dev-A"));
        cache.record(2, DeviceId::from("dev-B"));

        let alive: HashSet<ProcessId> = [2].into_iter().collect();
        assert_eq!(cache.retain_pids(&alive), 1);
        assert_eq!(cache.iter().collect::<Vec<_>>(), vec![(2, &DeviceId::from("dev-B"))]);
    }
}
