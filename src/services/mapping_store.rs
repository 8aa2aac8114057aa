use crate::error::Result;
use crate::model::Mapping;
use crate::services::audio::DeviceCatalog;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Хранилище маппинга "экран -> устройство" в JSON файле.
///
/// Источник истины для маппинга: при загрузке записи с исчезнувшими
/// устройствами удаляются, и исправленный маппинг сразу сохраняется.
pub struct MappingStore {
    path: PathBuf,
    catalog: Arc<DeviceCatalog>,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>, catalog: Arc<DeviceCatalog>) -> Self {
        Self {
            path: path.into(),
            catalog,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Отсутствующий или повреждённый файл даёт пустой маппинг
    pub async fn load(&self) -> Mapping {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!("Файл маппинга не найден: {:?}", self.path);
                return Mapping::new();
            }
            Err(e) => {
                error!("Не удалось прочитать файл маппинга {:?}: {}", self.path, e);
                return Mapping::new();
            }
        };

        let mut mapping: Mapping = match serde_json::from_str(&raw) {
            Ok(mapping) => mapping,
            Err(e) => {
                error!(
                    "Файл маппинга пуст или повреждён: {:?} ({}). Используется пустой маппинг",
                    self.path, e
                );
                return Mapping::new();
            }
        };

        let devices = self.catalog.refresh().await;
        let removed = mapping.retain_live(&devices);

        if !removed.is_empty() {
            warn!(
                "Часть настроенных устройств больше недоступна (экраны: {}). Очищаем маппинг",
                removed.join(", ")
            );
            if let Err(e) = self.save(&mapping).await {
                error!("Не удалось сохранить очищенный маппинг: {}", e);
            }
        }

        debug!("Маппинг загружен: {} записей", mapping.len());
        mapping
    }

    /// Запись во временный файл рядом с целевым и атомарная замена
    pub async fn save(&self, mapping: &Mapping) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        mapping.serialize(&mut serializer)?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &buffer).await?;
        fs::rename(&tmp_path, &self.path).await?;

        info!("Маппинг сохранён в {:?} ({} записей)", self.path, mapping.len());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
