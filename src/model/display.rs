use serde::{Deserialize, Serialize};
use std::fmt;

use super::ProcessId;

/// Префикс пути устройства монитора в Win32 (`\\.\DISPLAY1`)
const DEVICE_PATH_PREFIX: &str = r"\\.\";

/// Прямоугольник в координатах виртуального рабочего стола
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: right.saturating_sub(left).max(0) as u32,
            height: bottom.saturating_sub(top).max(0) as u32,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Физический экран. Имя назначается по порядку перечисления и не переживает
/// переконфигурацию мониторов.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Display {
    pub name: String,
    pub device_name: String,
    pub rect: Rect,
}

impl Display {
    /// Порядковое имя: индекс 0 -> "Screen1"
    pub fn ordinal_name(index: usize) -> String {
        format!("Screen{}", index + 1)
    }
}

impl fmt::Display for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.device_name, self.rect)
    }
}

/// Окно переднего плана и экран, на котором оно находится
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForegroundWindow {
    pub pid: ProcessId,
    pub title: String,
    pub display: Option<String>,
}

impl ForegroundWindow {
    pub fn new(pid: ProcessId, title: impl Into<String>) -> Self {
        Self {
            pid,
            title: title.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

impl fmt::Display for ForegroundWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PID {} \"{}\" на {}",
            self.pid,
            self.title,
            self.display.as_deref().unwrap_or("<неизвестный экран>")
        )
    }
}

/// `\\.\DISPLAY2` -> `Screen2`. Всё, что не содержит `DISPLAY` и цифр, даёт `None`.
pub fn screen_name_from_device(device_path: &str) -> Option<String> {
    let base = device_path
        .strip_prefix(DEVICE_PATH_PREFIX)
        .unwrap_or(device_path);

    if !base.contains("DISPLAY") {
        return None;
    }

    let digits: String = base.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("Screen{}", digits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_name_from_device() {
        assert_eq!(screen_name_from_device(r"\\.\DISPLAY1"), Some("Screen1".to_string()));
        assert_eq!(screen_name_from_device(r"\\.\DISPLAY12"), Some("Screen12".to_string()));
        assert_eq!(screen_name_from_device("DISPLAY3"), Some("Screen3".to_string()));
        assert_eq!(screen_name_from_device(r"\\.\DISPLAY"), None);
        assert_eq!(screen_name_from_device(r"\\.\MONITOR1"), None);
        assert_eq!(screen_name_from_device(""), None);
    }

    #[test]
    fn test_rect_from_edges() {
        let rect = Rect::from_edges(-1920, 0, 0, 1080);
        assert_eq!(rect, Rect { x: -1920, y: 0, width: 1920, height: 1080 });
        assert_eq!(Rect::from_edges(10, 10, 5, 5).width, 0);
    }

    #[test]
    fn test_foreground_window_creation() {
        let window = ForegroundWindow::new(42, "Player").with_display("Screen1");
        assert_eq!(window.pid, 42);
        assert_eq!(window.display.as_deref(), Some("Screen1"));
        assert_eq!(Display::ordinal_name(0), "Screen1");
    }
}
