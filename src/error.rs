use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ошибка отслеживания файла: {0}")]
    Watch(#[from] notify::Error),

    #[cfg(windows)]
    #[error("Ошибка Windows API: {0}")]
    Windows(#[from] windows::core::Error),

    #[error("Устройство не найдено: {0}")]
    DeviceNotFound(String),

    #[error("Не удалось назначить устройство процессу {pid}: {reason}")]
    AssignFailed { pid: u32, reason: String },

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Канал закрыт: {0}")]
    Channel(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl RouterError {
    pub fn device_not_found<T>(msg: impl Into<String>) -> Result<T> {
        Err(RouterError::DeviceNotFound(msg.into()))
    }

    pub fn assign_failed(pid: u32, reason: impl Into<String>) -> Self {
        RouterError::AssignFailed {
            pid,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! router_error {
    (channel, $($arg:tt)*) => {
        $crate::error::RouterError::Channel(format!($($arg)*))
    };
    (device_not_found, $($arg:tt)*) => {
        $crate::error::RouterError::DeviceNotFound(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::RouterError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::RouterError::Internal(format!($($arg)*))
    };
}
