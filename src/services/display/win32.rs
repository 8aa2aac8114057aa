use crate::error::Result;
use crate::model::{screen_name_from_device, Display, ForegroundWindow, ProcessId, Rect};
use crate::utils::blocking::run_blocking;
use std::collections::HashMap;
use tracing::{debug, error, info};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, MonitorFromWindow, HDC, HMONITOR, MONITORINFO,
    MONITORINFOEXW, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
};

use super::r#trait::DisplayPort;

pub struct Win32DisplayPort;

impl Win32DisplayPort {
    pub fn new() -> Self {
        info!("Инициализация Win32DisplayPort");
        Self
    }

    fn monitors() -> Vec<HMONITOR> {
        unsafe extern "system" fn collect(
            monitor: HMONITOR,
            _hdc: HDC,
            _clip: *mut RECT,
            data: LPARAM,
        ) -> BOOL {
            let monitors = &mut *(data.0 as *mut Vec<HMONITOR>);
            monitors.push(monitor);
            TRUE
        }

        let mut monitors: Vec<HMONITOR> = Vec::new();
        unsafe {
            let _ = EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(collect),
                LPARAM(&mut monitors as *mut Vec<HMONITOR> as isize),
            );
        }
        monitors
    }

    /// Путь устройства (`\\.\DISPLAY1`) и прямоугольник монитора
    fn monitor_info(monitor: HMONITOR) -> Option<(String, Rect)> {
        let mut info = MONITORINFOEXW::default();
        info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;

        let ok = unsafe {
            GetMonitorInfoW(monitor, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO)
        };
        if !ok.as_bool() {
            return None;
        }

        let len = info
            .szDevice
            .iter()
            .position(|c| *c == 0)
            .unwrap_or(info.szDevice.len());
        let device = String::from_utf16_lossy(&info.szDevice[..len]);
        let r = info.monitorInfo.rcMonitor;
        Some((device, Rect::from_edges(r.left, r.top, r.right, r.bottom)))
    }

    fn display_of_window(hwnd: HWND) -> Option<String> {
        let monitor = unsafe { MonitorFromWindow(hwnd, MONITOR_DEFAULTTONEAREST) };
        let (device, _) = Self::monitor_info(monitor)?;
        screen_name_from_device(&device)
    }

    fn window_pid(hwnd: HWND) -> Option<ProcessId> {
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
        (pid != 0).then_some(pid)
    }

    fn window_title(hwnd: HWND) -> String {
        let mut buffer = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut buffer) };
        String::from_utf16_lossy(&buffer[..len.max(0) as usize])
    }

    fn list_displays_blocking() -> Result<Vec<Display>> {
        let displays = Self::monitors()
            .into_iter()
            .enumerate()
            .filter_map(|(index, monitor)| {
                let (device_name, rect) = Self::monitor_info(monitor)?;
                Some(Display {
                    name: Display::ordinal_name(index),
                    device_name,
                    rect,
                })
            })
            .collect();
        Ok(displays)
    }

    fn foreground_blocking() -> Result<Option<ForegroundWindow>> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.is_invalid() {
            return Ok(None);
        }

        let Some(pid) = Self::window_pid(hwnd) else {
            return Ok(None);
        };

        Ok(Some(ForegroundWindow {
            pid,
            title: Self::window_title(hwnd),
            display: Self::display_of_window(hwnd),
        }))
    }

    fn visible_owners_blocking() -> Result<HashMap<ProcessId, String>> {
        unsafe extern "system" fn collect(hwnd: HWND, data: LPARAM) -> BOOL {
            let windows = &mut *(data.0 as *mut Vec<HWND>);
            if IsWindowVisible(hwnd).as_bool() {
                windows.push(hwnd);
            }
            TRUE
        }

        let mut windows: Vec<HWND> = Vec::new();
        unsafe { EnumWindows(Some(collect), LPARAM(&mut windows as *mut Vec<HWND> as isize))? };

        let mut owners = HashMap::new();
        for hwnd in windows {
            let (Some(pid), Some(display)) = (Self::window_pid(hwnd), Self::display_of_window(hwnd))
            else {
                continue;
            };
            owners.insert(pid, display);
        }
        debug!("Видимых окон с экраном: {} процессов", owners.len());
        Ok(owners)
    }
}

#[async_trait::async_trait]
impl DisplayPort for Win32DisplayPort {
    async fn list_displays(&self) -> Vec<Display> {
        run_blocking(Self::list_displays_blocking)
            .await
            .unwrap_or_else(|e| {
                error!("Ошибка перечисления мониторов: {}", e);
                Vec::new()
            })
    }

    async fn foreground_process(&self) -> Option<ForegroundWindow> {
        run_blocking(Self::foreground_blocking)
            .await
            .unwrap_or_else(|e| {
                error!("Ошибка получения активного окна: {}", e);
                None
            })
    }

    async fn all_visible_window_owners(&self) -> HashMap<ProcessId, String> {
        run_blocking(Self::visible_owners_blocking)
            .await
            .unwrap_or_else(|e| {
                error!("Ошибка перечисления окон: {}", e);
                HashMap::new()
            })
    }
}
