use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub routing: RoutingConfig,
    pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    pub polling_interval_ms: u64,
    pub device_cache_ttl_ms: u64,
    pub prune_stale_pids: bool,
    pub prune_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    pub file: PathBuf,
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
            },
            routing: RoutingConfig {
                polling_interval_ms: 100,
                device_cache_ttl_ms: 2000,
                prune_stale_pids: true,
                prune_interval_ms: 5000,
            },
            mapping: MappingConfig {
                file: PathBuf::from("screen_audio_mapping.json"),
                watch: true,
            },
        }
    }
}

impl RoutingConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn device_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.device_cache_ttl_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }
}

impl Config {
    /// Загружает конфигурацию: значения по умолчанию, затем TOML файл (если есть), затем `SAR_*`
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("SAR_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "pretty" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация настроек маршрутизации
        if !(10..=10_000).contains(&self.routing.polling_interval_ms) {
            anyhow::bail!(
                "polling_interval_ms должно быть в диапазоне 10..=10000, получено {}",
                self.routing.polling_interval_ms
            );
        }

        if self.routing.prune_interval_ms < self.routing.polling_interval_ms {
            anyhow::bail!("prune_interval_ms не может быть меньше polling_interval_ms");
        }

        if self.mapping.file.as_os_str().is_empty() {
            anyhow::bail!("Путь к файлу маппинга не может быть пустым");
        }

        Ok(())
    }
}
