use crate::model::{Display, ForegroundWindow, ProcessId, Rect};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::info;

use super::r#trait::DisplayPort;

/// Эмуляция рабочего стола: экраны и окна задаются вручную.
///
/// В демо-режиме (`new`) передний план переключается между фейковыми окнами
/// каждые 10 секунд, в тестах (`scripted`) только через `focus`.
pub struct DryRunDisplayPort {
    displays: Vec<Display>,
    state: RwLock<DryRunDisplayState>,
}

struct DryRunDisplayState {
    windows: Vec<ForegroundWindow>,
    focused: Option<usize>,
    rotate_every: Option<Duration>,
    last_switch: Instant,
}

impl Default for DryRunDisplayPort {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunDisplayPort {
    pub fn new() -> Self {
        info!("Dry-run режим - DisplayPort работает в режиме эмуляции");

        let port = Self::scripted(&["Screen1", "Screen2"]);
        {
            let mut state = port.state.write();
            state.windows = vec![
                ForegroundWindow::new(1001, "Terminal - dry_run").with_display("Screen1"),
                ForegroundWindow::new(1002, "Browser - dry_run").with_display("Screen2"),
                ForegroundWindow::new(1003, "Editor - dry_run").with_display("Screen1"),
            ];
            state.focused = Some(0);
            state.rotate_every = Some(Duration::from_secs(10));
        }
        port
    }

    /// Экраны 1920x1080, расположенные слева направо, без окон
    pub fn scripted(display_names: &[&str]) -> Self {
        let displays = display_names
            .iter()
            .enumerate()
            .map(|(index, name)| Display {
                name: name.to_string(),
                device_name: format!(r"\\.\DISPLAY{}", index + 1),
                rect: Rect {
                    x: 1920 * index as i32,
                    y: 0,
                    width: 1920,
                    height: 1080,
                },
            })
            .collect();

        Self {
            displays,
            state: RwLock::new(DryRunDisplayState {
                windows: Vec::new(),
                focused: None,
                rotate_every: None,
                last_switch: Instant::now(),
            }),
        }
    }

    /// Добавляет (или перемещает) окно процесса и делает его активным
    pub fn focus(&self, pid: ProcessId, title: &str, display: Option<&str>) {
        let mut window = ForegroundWindow::new(pid, title);
        window.display = display.map(str::to_string);

        let mut state = self.state.write();
        let index = match state.windows.iter().position(|w| w.pid == pid) {
            Some(index) => {
                state.windows[index] = window;
                index
            }
            None => {
                state.windows.push(window);
                state.windows.len() - 1
            }
        };
        state.focused = Some(index);
    }

    /// Видимое окно без фокуса
    pub fn add_window(&self, pid: ProcessId, title: &str, display: &str) {
        self.state
            .write()
            .windows
            .push(ForegroundWindow::new(pid, title).with_display(display));
    }

    /// Эмулирует завершение процесса
    pub fn close_process(&self, pid: ProcessId) {
        let mut state = self.state.write();
        let focused_pid = state.focused.and_then(|i| state.windows.get(i)).map(|w| w.pid);
        state.windows.retain(|w| w.pid != pid);
        state.focused = focused_pid
            .filter(|p| *p != pid)
            .and_then(|p| state.windows.iter().position(|w| w.pid == p));
    }

    pub fn clear_focus(&self) {
        self.state.write().focused = None;
    }
}

#[async_trait::async_trait]
impl DisplayPort for DryRunDisplayPort {
    async fn list_displays(&self) -> Vec<Display> {
        self.displays.clone()
    }

    async fn foreground_process(&self) -> Option<ForegroundWindow> {
        let mut state = self.state.write();

        if let (Some(every), Some(current)) = (state.rotate_every, state.focused) {
            if state.last_switch.elapsed() >= every && !state.windows.is_empty() {
                let next = (current + 1) % state.windows.len();
                state.focused = Some(next);
                state.last_switch = Instant::now();
                info!("Dry-run: эмулируем смену окна на: {}", state.windows[next]);
            }
        }

        state.focused.and_then(|i| state.windows.get(i)).cloned()
    }

    async fn all_visible_window_owners(&self) -> HashMap<ProcessId, String> {
        let state = self.state.read();
        let mut owners = HashMap::new();
        for window in &state.windows {
            if let Some(display) = &window.display {
                owners.insert(window.pid, display.clone());
            }
        }
        owners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_focus() {
        let port = DryRunDisplayPort::scripted(&["Screen1", "Screen2"]);
        assert!(port.foreground_process().await.is_none());

        port.focus(42, "Player", Some("Screen1"));
        let fg = port.foreground_process().await.unwrap();
        assert_eq!(fg.pid, 42);
        assert_eq!(fg.display.as_deref(), Some("Screen1"));

        port.focus(42, "Player", Some("Screen2"));
        let fg = port.foreground_process().await.unwrap();
        assert_eq!(fg.display.as_deref(), Some("Screen2"));
        assert_eq!(port.all_visible_window_owners().await.len(), 1);
    }

    #[tokio::test]
    async fn test_visible_owners_last_window_wins() {
        let port = DryRunDisplayPort::scripted(&["Screen1", "Screen2"]);
        port.add_window(10, "Main", "Screen1");
        port.add_window(10, "Popup", "Screen2");
        port.focus(11, "Untracked monitor", None);

        let owners = port.all_visible_window_owners().await;
        assert_eq!(owners.get(&10).map(String::as_str), Some("Screen2"));
        assert!(!owners.contains_key(&11));
    }

    #[tokio::test]
    async fn test_close_process_drops_focus() {
        let port = DryRunDisplayPort::scripted(&["Screen1"]);
        port.add_window(1, "Other", "Screen1");
        port.focus(2, "Focused", Some("Screen1"));

        port.close_process(2);
        assert!(port.foreground_process().await.is_none());
        assert_eq!(port.all_visible_window_owners().await.len(), 1);
    }

    #[tokio::test]
    async fn test_displays_are_ordinal() {
        let port = DryRunDisplayPort::new();
        let displays = port.list_displays().await;
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[1].name, "Screen2");
        assert_eq!(displays[1].device_name, r"\\.\DISPLAY2");
    }
}
