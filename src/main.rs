use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, warn};
mod config;
mod error;
mod model;
mod services;
mod utils;

use config::{Config, LoggingConfig};
use model::{Mapping, Volume};
use services::{
    create_audio_port,
    create_display_port,
    DeviceCatalog,
    DisplayPort,
    MappingStore,
    MappingWatcher,
    ReconciliationCache,
    Router,
    RouterHandle,
    RouterSettings,
};

#[derive(Parser, Debug)]
#[command(name = "screen-audio-router")]
#[command(about = "Направляет звук приложения на аудиоустройство экрана, где находится его окно")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "screen-audio-router.toml")]
    config: String,

    /// Путь к файлу маппинга экранов (переопределяет mapping.file)
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Режим сухого запуска (эмуляция экранов и устройств)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (переопределяет logging.level)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Запустить мониторинг (по умолчанию)
    Run,
    /// Показать экраны и назначенные им устройства
    Screens,
    /// Показать активные устройства вывода
    Devices,
    /// Назначить экрану устройство по дружественному имени
    Map { screen: String, device: String },
    /// Снять назначение с экрана
    Unmap { screen: String },
    /// Показать или изменить громкость устройства экрана
    Volume {
        screen: String,
        /// Относительное изменение, например -5 или 5
        #[arg(long, allow_negative_numbers = true, conflicts_with = "set")]
        delta: Option<i32>,
        /// Абсолютное значение 0..=100
        #[arg(long, allow_negative_numbers = true)]
        set: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации с переопределениями из командной строки
    let mut config = Config::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(mapping) = &args.mapping {
        config.mapping.file = mapping.clone();
    }
    config.validate()?;

    // Инициализация системы логирования
    init_tracing(&config.logging)?;

    info!("Запуск Screen Audio Router v{}", env!("CARGO_PKG_VERSION"));
    debug!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - экраны и устройства эмулируются");
    }

    // Инициализация компонентов
    let audio = create_audio_port(args.dry_run)?;
    let display = create_display_port(args.dry_run)?;
    let catalog = Arc::new(DeviceCatalog::new(audio, config.routing.device_cache_ttl()));
    let store = Arc::new(MappingStore::new(config.mapping.file.clone(), catalog.clone()));

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_monitor(&config, display, catalog, store).await,
        Command::Screens => list_screens(display.as_ref(), &store).await,
        Command::Devices => list_devices(&catalog).await,
        Command::Map { screen, device } => map_screen(display.as_ref(), &catalog, &store, screen, device).await,
        Command::Unmap { screen } => unmap_screen(&store, &screen).await,
        Command::Volume { screen, delta, set } => {
            screen_volume(&catalog, &store, &screen, delta, set).await
        }
    }
}

/// Мониторинг до Ctrl+C. Цикл запускается только при непустом маппинге,
/// изменения файла маппинга передаются в работающий цикл.
async fn run_monitor(
    config: &Config,
    display: Arc<dyn DisplayPort>,
    catalog: Arc<DeviceCatalog>,
    store: Arc<MappingStore>,
) -> Result<()> {
    let settings = RouterSettings::from(&config.routing);
    let mut current = store.load().await;
    let mut cache = ReconciliationCache::new();

    let start = |mapping: Mapping, cache: ReconciliationCache| -> RouterHandle {
        Router::new(display.clone(), catalog.clone(), mapping, cache, settings.clone()).start()
    };

    let mut router = if current.is_empty() {
        warn!(
            "Маппинг пуст, мониторинг не запущен. Назначьте устройство командой `map` или отредактируйте {:?}",
            store.path()
        );
        None
    } else {
        Some(start(current.clone(), std::mem::take(&mut cache)))
    };

    let mut watcher = if config.mapping.watch {
        match MappingWatcher::new(store.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Не удалось отслеживать файл маппинга: {}", e);
                None
            }
        }
    } else {
        None
    };

    info!("Все сервисы запущены");

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
                    Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
                }
                break;
            }
            Some(mapping) = next_mapping(&mut watcher) => {
                if mapping == current {
                    debug!("Маппинг не изменился");
                    continue;
                }
                current = mapping.clone();

                router = match router.take() {
                    Some(handle) if mapping.is_empty() => {
                        cache = handle.stop().await?;
                        info!("Маппинг пуст, мониторинг остановлен");
                        None
                    }
                    Some(handle) => match handle.replace_mapping(mapping.clone()).await {
                        Ok(()) => Some(handle),
                        Err(e) => {
                            warn!("{}, перезапускаем мониторинг", e);
                            cache = handle.stop().await?;
                            Some(start(mapping, std::mem::take(&mut cache)))
                        }
                    },
                    None if mapping.is_empty() => None,
                    None => {
                        info!("Маппинг задан, запускаем мониторинг");
                        Some(start(mapping, std::mem::take(&mut cache)))
                    }
                };
            }
        }
    }

    info!("Завершение работы...");

    if let Some(handle) = router.take() {
        let shutdown_timeout = tokio::time::Duration::from_secs(5);
        match tokio::time::timeout(shutdown_timeout, handle.stop()).await {
            Ok(Ok(cache)) => info!("Цикл маршрутизации завершён, обработано PID: {}", cache.len()),
            Ok(Err(e)) => error!("Ошибка остановки цикла маршрутизации: {}", e),
            Err(_) => warn!("Таймаут при завершении цикла маршрутизации"),
        }
    }

    info!("Screen Audio Router завершил работу");
    Ok(())
}

async fn next_mapping(watcher: &mut Option<MappingWatcher>) -> Option<Mapping> {
    match watcher {
        Some(watcher) => watcher.next_mapping().await,
        None => std::future::pending().await,
    }
}

async fn list_screens(display: &dyn DisplayPort, store: &MappingStore) -> Result<()> {
    let mapping = store.load().await;
    let displays = display.list_displays().await;

    if displays.is_empty() {
        println!("Экраны не найдены");
    }
    for screen in displays {
        let device = mapping.device_for(&screen.name).unwrap_or("-");
        println!("{:<10} {:<16} {:<22} -> {}", screen.name, screen.device_name, screen.rect.to_string(), device);
    }
    Ok(())
}

async fn list_devices(catalog: &DeviceCatalog) -> Result<()> {
    let port = catalog.port();
    let devices = catalog.refresh().await;
    let default = port.default_output_device().await;

    if devices.is_empty() {
        println!("Активные устройства вывода не найдены");
    }
    for (name, id) in &devices {
        let marker = if default.as_ref().is_some_and(|d| &d.id == id) { "*" } else { " " };
        let volume = port.get_volume(id).await;
        println!("{} {:<40} {:>4}  {}", marker, name, volume.to_string(), id);
    }
    Ok(())
}

async fn map_screen(
    display: &dyn DisplayPort,
    catalog: &DeviceCatalog,
    store: &MappingStore,
    screen: String,
    device: String,
) -> Result<()> {
    if catalog.refresh().await.get(&device).is_none() {
        anyhow::bail!("Устройство \"{}\" не найдено среди активных (см. команду devices)", device);
    }

    if !display.list_displays().await.iter().any(|d| d.name == screen) {
        warn!("Экран {} сейчас не подключён, назначение всё равно сохранено", screen);
    }

    let mut mapping = store.load().await;
    mapping.set(screen.clone(), device.clone());
    store
        .save(&mapping)
        .await
        .with_context(|| format!("Не удалось сохранить маппинг в {:?}", store.path()))?;

    println!("{} -> {}", screen, device);
    Ok(())
}

async fn unmap_screen(store: &MappingStore, screen: &str) -> Result<()> {
    let mut mapping = store.load().await;
    match mapping.remove(screen) {
        Some(device) => {
            store
                .save(&mapping)
                .await
                .with_context(|| format!("Не удалось сохранить маппинг в {:?}", store.path()))?;
            println!("{} больше не назначен на {}", screen, device);
        }
        None => println!("Экран {} не назначен", screen),
    }
    Ok(())
}

async fn screen_volume(
    catalog: &DeviceCatalog,
    store: &MappingStore,
    screen: &str,
    delta: Option<i32>,
    set: Option<i32>,
) -> Result<()> {
    let mapping = store.load().await;
    let Some(device_name) = mapping.device_for(screen) else {
        anyhow::bail!("Экрану {} не назначено устройство", screen);
    };
    let Some(id) = catalog.resolve(device_name).await else {
        anyhow::bail!("Устройство \"{}\" недоступно", device_name);
    };

    let port = catalog.port();
    let current = port.get_volume(&id).await;
    let target = match (delta, set) {
        (Some(delta), _) => Some(current.adjusted(delta)),
        (None, Some(value)) => Some(Volume::clamped(value)),
        (None, None) => None,
    };

    match target {
        Some(volume) => {
            port.set_volume(&id, i32::from(volume.percent())).await;
            println!("{} ({}): {} -> {}", screen, device_name, current, port.get_volume(&id).await);
        }
        None => println!("{} ({}): {}", screen, device_name, current),
    }
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "pretty" {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    }

    Ok(())
}
