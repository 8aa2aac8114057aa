use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::DeviceMap;

/// Пользовательский маппинг: имя экрана -> дружественное имя аудиоустройства.
///
/// Пустое значение означает "экран не назначен" и никогда не маршрутизируется.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping(BTreeMap<String, String>);

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Настроенное имя устройства для экрана, если оно не пустое
    pub fn device_for(&self, display: &str) -> Option<&str> {
        self.0
            .get(display)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn set(&mut self, display: impl Into<String>, device_name: impl Into<String>) {
        self.0.insert(display.into(), device_name.into());
    }

    pub fn remove(&mut self, display: &str) -> Option<String> {
        self.0.remove(display)
    }

    /// Оставляет только записи, чьё устройство присутствует среди живых.
    /// Возвращает имена экранов, записи которых были удалены.
    pub fn retain_live(&mut self, devices: &DeviceMap) -> Vec<String> {
        let mut removed = Vec::new();
        self.0.retain(|display, device_name| {
            let live = devices.contains_key(device_name.as_str());
            if !live {
                removed.push(display.clone());
            }
            live
        });
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
