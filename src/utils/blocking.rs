use crate::error::{RouterError, Result};

/// Выполняет синхронный вызов ОС в пуле блокирующих потоков tokio
pub async fn run_blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| RouterError::Internal(format!("блокирующая задача завершилась аварийно: {}", e)))?
}
