use crate::error::Result;
use crate::model::{Display, ForegroundWindow, ProcessId};
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for display/window backends that can run in different modes
#[async_trait::async_trait]
pub trait DisplayPort: Send + Sync {
    /// Displays named "Screen1", "Screen2", ... in enumeration order
    async fn list_displays(&self) -> Vec<Display>;

    /// Owner of the current foreground window and the display it is on
    async fn foreground_process(&self) -> Option<ForegroundWindow>;

    /// Every visible top-level window mapped to its owner; the last window seen wins
    async fn all_visible_window_owners(&self) -> HashMap<ProcessId, String>;
}

/// Factory function to create an appropriate display port based on the dry_run flag
pub fn create_display_port(dry_run: bool) -> Result<Arc<dyn DisplayPort>> {
    if dry_run {
        return Ok(Arc::new(super::dry_run::DryRunDisplayPort::new()));
    }

    #[cfg(windows)]
    {
        Ok(Arc::new(super::win32::Win32DisplayPort::new()))
    }

    #[cfg(not(windows))]
    {
        Err(crate::router_error!(
            service_unavailable,
            "определение окон доступно только в Windows, используйте --dry-run"
        ))
    }
}
