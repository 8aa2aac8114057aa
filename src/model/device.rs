use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Непрозрачный стабильный идентификатор аудиоустройства (endpoint id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Дружественное имя устройства -> идентификатор
pub type DeviceMap = BTreeMap<String, DeviceId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Active,
    Inactive,
}

/// Устройство вывода звука
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub name: String,
    pub state: DeviceState,
}

impl AudioDevice {
    pub fn active(name: impl Into<String>, id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: DeviceState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == DeviceState::Active
    }
}

impl fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" [{}]", self.name, self.id)
    }
}

/// Громкость в процентах, всегда в диапазоне 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Volume(u8);

impl Volume {
    pub const MIN: Volume = Volume(0);
    pub const MAX: Volume = Volume(100);

    /// Любое целое приводится к диапазону 0..=100
    pub fn clamped(percent: i32) -> Self {
        Self(percent.clamp(0, 100) as u8)
    }

    /// Из скаляра платформы 0.0..=1.0 с округлением
    pub fn from_scalar(scalar: f32) -> Self {
        if !scalar.is_finite() {
            return Self::MIN;
        }
        Self::clamped((scalar * 100.0).round() as i32)
    }

    pub fn to_scalar(self) -> f32 {
        f32::from(self.0) / 100.0
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    pub fn adjusted(self, delta: i32) -> Self {
        Self::clamped(i32::from(self.0) + delta)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_is_clamped() {
        assert_eq!(Volume::clamped(-10), Volume::clamped(0));
        assert_eq!(Volume::clamped(150), Volume::clamped(100));
        assert_eq!(Volume::clamped(42).percent(), 42);
        assert_eq!(Volume::clamped(95).adjusted(10), Volume::MAX);
        assert_eq!(Volume::clamped(3).adjusted(-5), Volume::MIN);
    }

    #[test]
    fn test_volume_scalar_conversion() {
        assert_eq!(Volume::from_scalar(0.494), Volume::clamped(49));
        assert_eq!(Volume::from_scalar(0.496), Volume::clamped(50));
        assert_eq!(Volume::from_scalar(1.7), Volume::MAX);
        assert_eq!(Volume::from_scalar(f32::NAN), Volume::MIN);
        assert!((Volume::clamped(25).to_scalar() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_audio_device_display() {
        let device = AudioDevice::active("Speakers", "dev-A");
        assert!(device.is_active());
        assert_eq!(device.to_string(), "\"Speakers\" [dev-A]");
    }
}
