//! Hot reload of the mapping file

use crate::error::Result;
use crate::model::Mapping;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::mapping_store::MappingStore;

/// Задержка после события, чтобы запись файла успела завершиться
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Следит за файлом маппинга и отдаёт заново загруженный (и очищенный) маппинг
pub struct MappingWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Mapping>,
}

impl MappingWatcher {
    pub fn new(store: Arc<MappingStore>) -> Result<Self> {
        let (tx, rx) = mpsc::channel(10);

        // Сохранение идёт через rename, поэтому следим за каталогом, а не за самим файлом
        let watched_dir = match store.path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        let file_name = store.path().file_name().map(|n| n.to_os_string());

        // Колбэки notify выполняются в собственном потоке, вне контекста tokio
        let runtime_handle = tokio::runtime::Handle::current();
        let callback_store = store.clone();

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let touches_mapping = event
                        .paths
                        .iter()
                        .any(|path| path.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_mapping {
                        return;
                    }

                    debug!("Файл маппинга изменён: {:?}", event.paths);
                    let store = callback_store.clone();
                    let tx = tx.clone();
                    runtime_handle.spawn(async move {
                        tokio::time::sleep(DEBOUNCE).await;
                        let mapping = store.load().await;
                        if let Err(e) = tx.send(mapping).await {
                            error!("Не удалось передать обновлённый маппинг: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Ошибка отслеживания файла маппинга: {}", e);
                }
            }
        })?;

        watcher.watch(&watched_dir, RecursiveMode::NonRecursive)?;
        info!("Отслеживание файла маппинга запущено: {:?}", store.path());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Следующая версия маппинга; `None`, если наблюдатель закрыт
    pub async fn next_mapping(&mut self) -> Option<Mapping> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::audio::{DeviceCatalog, DryRunAudioPort};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_edit_triggers_reload() {
        let dir = TempDir::new().unwrap();
        let port = Arc::new(DryRunAudioPort::with_devices([
            ("Speakers", "dev-A"),
            ("Headphones", "dev-B"),
        ]));
        let catalog = Arc::new(DeviceCatalog::new(port, Duration::ZERO));
        let store = Arc::new(MappingStore::new(dir.path().join("mapping.json"), catalog));
        store
            .save(&[("Screen1", "Speakers")].into_iter().collect())
            .await
            .unwrap();

        let mut watcher = MappingWatcher::new(store.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(
            store.path(),
            r#"{"Screen1": "Headphones", "Screen2": "Gone"}"#,
        )
        .unwrap();

        let reloaded = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match watcher.next_mapping().await {
                    Some(mapping) if mapping.device_for("Screen1") == Some("Headphones") => {
                        return Some(mapping)
                    }
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(reloaded.len(), 1);
    }
}
