use crate::config::RoutingConfig;
use crate::error::{Result, RouterError};
use crate::model::{Mapping, ProcessId};
use crate::services::audio::{AudioDevicePort, DeviceCatalog};
use crate::services::display::DisplayPort;
use crate::services::reconcile::{apply_delta, resolve_all, ReconciliationCache};
use crate::{debug_if_enabled, trace_if_enabled};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

/// Результат одного тика маршрутизации
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Нет активного окна или его экран не определён
    NoForeground,
    /// Для экрана нет записи в маппинге
    Unmapped,
    /// Устройство из маппинга отсутствует среди живых
    DeviceUnavailable,
    /// Процессу уже назначено нужное устройство
    CacheHit,
    Applied,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub polling_interval: Duration,
    pub prune_stale_pids: bool,
    pub prune_interval: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_millis(100),
            prune_stale_pids: true,
            prune_interval: Duration::from_secs(5),
        }
    }
}

impl From<&RoutingConfig> for RouterSettings {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            polling_interval: config.polling_interval(),
            prune_stale_pids: config.prune_stale_pids,
            prune_interval: config.prune_interval(),
        }
    }
}

#[derive(Debug)]
pub enum RouterCommand {
    ReplaceMapping(Mapping),
    Stop,
}

/// Цикл маршрутизации: единственный владелец маппинга и кэша согласования.
///
/// После `start` управление только через `RouterHandle`: команды обрабатываются
/// между тиками, поэтому смена маппинга не может пересечься с тиком в процессе.
pub struct Router {
    audio: Arc<dyn AudioDevicePort>,
    display: Arc<dyn DisplayPort>,
    catalog: Arc<DeviceCatalog>,
    mapping: Mapping,
    cache: ReconciliationCache,
    settings: RouterSettings,
    last_prune: Instant,
}

impl Router {
    pub fn new(
        display: Arc<dyn DisplayPort>,
        catalog: Arc<DeviceCatalog>,
        mapping: Mapping,
        cache: ReconciliationCache,
        settings: RouterSettings,
    ) -> Self {
        Self {
            audio: catalog.port().clone(),
            display,
            catalog,
            mapping,
            cache,
            settings,
            last_prune: Instant::now(),
        }
    }

    pub fn cache(&self) -> &ReconciliationCache {
        &self.cache
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Один шаг: активный процесс -> экран -> устройство -> сравнение с кэшем -> назначение
    pub async fn tick(&mut self) -> TickOutcome {
        let Some(foreground) = self.display.foreground_process().await else {
            trace_if_enabled!("Нет активного окна");
            return TickOutcome::NoForeground;
        };
        let Some(screen) = foreground.display.as_deref() else {
            trace_if_enabled!("Экран активного окна не определён: {}", foreground);
            return TickOutcome::NoForeground;
        };
        let Some(device_name) = self.mapping.device_for(screen) else {
            trace_if_enabled!("Экран {} не назначен", screen);
            return TickOutcome::Unmapped;
        };
        let Some(target) = self.catalog.resolve(device_name).await else {
            debug_if_enabled!("Устройство \"{}\" для {} недоступно", device_name, screen);
            return TickOutcome::DeviceUnavailable;
        };

        let pid = foreground.pid;
        if self.cache.get(pid) == Some(&target) {
            return TickOutcome::CacheHit;
        }

        info!(
            "Обновление аудиоустройства для PID {} на экране {}: \"{}\"",
            pid, screen, device_name
        );

        match self.audio.assign_process_device(pid, &target).await {
            Ok(()) => {
                self.cache.record(pid, target);
                TickOutcome::Applied
            }
            Err(e) => {
                warn!(
                    "Не удалось изменить аудиоустройство для PID {}, возможно у приложения нет звука: {}",
                    pid, e
                );
                self.cache.forget(pid);
                if !self.audio.device_exists(&target).await {
                    warn!("Устройство {} исчезло, сбрасываем каталог", target);
                    self.catalog.invalidate();
                }
                TickOutcome::Failed
            }
        }
    }

    /// Массовое согласование по всем видимым окнам
    pub async fn reconcile_all(&mut self) {
        let targets = resolve_all(self.display.as_ref(), &self.catalog, &self.mapping).await;
        self.cache = apply_delta(self.audio.as_ref(), &self.cache, targets).await;
    }

    /// Удаляет из кэша PID процессов без видимых окон (PID может быть переиспользован ОС)
    pub async fn prune_stale_pids(&mut self) -> usize {
        let alive: HashSet<ProcessId> = self
            .display
            .all_visible_window_owners()
            .await
            .into_keys()
            .collect();
        let removed = self.cache.retain_pids(&alive);
        if removed > 0 {
            debug_if_enabled!("Удалено {} устаревших PID из кэша", removed);
        }
        removed
    }

    async fn replace_mapping(&mut self, mapping: Mapping) {
        info!("Применение нового маппинга ({} записей)", mapping.len());
        self.mapping = mapping;
        self.reconcile_all().await;
    }

    /// Запускает цикл в отдельной задаче
    pub fn start(self) -> RouterHandle {
        let (tx, rx) = mpsc::channel(8);
        let join = tokio::spawn(self.run(rx));
        RouterHandle { tx, join }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RouterCommand>) -> ReconciliationCache {
        info!(
            "Запуск цикла маршрутизации (интервал {:?}, записей в маппинге: {})",
            self.settings.polling_interval,
            self.mapping.len()
        );

        self.reconcile_all().await;

        loop {
            self.tick().await;

            if self.settings.prune_stale_pids
                && self.last_prune.elapsed() >= self.settings.prune_interval
            {
                self.prune_stale_pids().await;
                self.last_prune = Instant::now();
            }

            tokio::select! {
                biased;
                command = rx.recv() => match command {
                    Some(RouterCommand::ReplaceMapping(mapping)) => self.replace_mapping(mapping).await,
                    Some(RouterCommand::Stop) | None => break,
                },
                _ = sleep(self.settings.polling_interval) => {}
            }
        }

        info!("Цикл маршрутизации остановлен, PID в кэше: {}", self.cache.len());
        self.cache
    }
}

/// Управление запущенным циклом маршрутизации
pub struct RouterHandle {
    tx: mpsc::Sender<RouterCommand>,
    join: JoinHandle<ReconciliationCache>,
}

impl RouterHandle {
    pub async fn replace_mapping(&self, mapping: Mapping) -> Result<()> {
        self.tx
            .send(RouterCommand::ReplaceMapping(mapping))
            .await
            .map_err(|_| crate::router_error!(channel, "цикл маршрутизации уже остановлен"))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Останавливает цикл и дожидается его завершения. Возвращает итоговый кэш.
    pub async fn stop(self) -> Result<ReconciliationCache> {
        // Если цикл уже завершился, канал закрыт: это не ошибка
        let _ = self.tx.send(RouterCommand::Stop).await;
        self.join
            .await
            .map_err(|e| RouterError::Internal(format!("задача маршрутизации упала: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceId;
    use crate::services::audio::DryRunAudioPort;
    use crate::services::display::DryRunDisplayPort;

    struct Fixture {
        audio: Arc<DryRunAudioPort>,
        display: Arc<DryRunDisplayPort>,
        catalog: Arc<DeviceCatalog>,
    }

    impl Fixture {
        fn new() -> Self {
            let audio = Arc::new(DryRunAudioPort::with_devices([
                ("Speakers", "dev-A"),
                ("Headphones", "dev-B"),
            ]));
            let display = Arc::new(DryRunDisplayPort::scripted(&["Screen1", "Screen2", "Screen3"]));
            let catalog = Arc::new(DeviceCatalog::new(audio.clone(), Duration::ZERO));
            Self { audio, display, catalog }
        }

        fn router(&self, mapping: Mapping) -> Router {
            Router::new(
                self.display.clone(),
                self.catalog.clone(),
                mapping,
                ReconciliationCache::new(),
                RouterSettings {
                    polling_interval: Duration::from_millis(10),
                    ..Default::default()
                },
            )
        }
    }

    fn speakers_on_screen1() -> Mapping {
        [("Screen1", "Speakers")].into_iter().collect()
    }

    #[tokio::test]
    async fn test_foreground_on_mapped_screen_is_applied_once() {
        let fx = Fixture::new();
        let mut router = fx.router(speakers_on_screen1());
        fx.display.focus(42, "Player", Some("Screen1"));

        assert_eq!(router.tick().await, TickOutcome::Applied);
        assert_eq!(router.cache().get(42), Some(&DeviceId::from("dev-A")));
        assert_eq!(router.cache().len(), 1);
        assert_eq!(fx.audio.assignments(), vec![(42, DeviceId::from("dev-A"))]);

        // Следующий тик: тот же процесс, попадание в кэш
        assert_eq!(router.tick().await, TickOutcome::CacheHit);
        assert_eq!(fx.audio.assignments().len(), 1);
    }

    #[tokio::test]
    async fn test_unmapped_screen_makes_no_call() {
        let fx = Fixture::new();
        let mut router = fx.router(speakers_on_screen1());
        fx.display.focus(7, "Chat", Some("Screen3"));

        assert_eq!(router.tick().await, TickOutcome::Unmapped);
        assert!(fx.audio.assignments().is_empty());
        assert!(router.cache().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_display_and_no_foreground() {
        let fx = Fixture::new();
        let mut router = fx.router(speakers_on_screen1());

        assert_eq!(router.tick().await, TickOutcome::NoForeground);

        fx.display.focus(5, "Somewhere", None);
        assert_eq!(router.tick().await, TickOutcome::NoForeground);
        assert!(fx.audio.assignments().is_empty());
    }

    #[tokio::test]
    async fn test_moving_window_reassigns_device() {
        let fx = Fixture::new();
        let mapping: Mapping = [("Screen1", "Speakers"), ("Screen2", "Headphones")]
            .into_iter()
            .collect();
        let mut router = fx.router(mapping);

        fx.display.focus(42, "Player", Some("Screen1"));
        assert_eq!(router.tick().await, TickOutcome::Applied);

        fx.display.focus(42, "Player", Some("Screen2"));
        assert_eq!(router.tick().await, TickOutcome::Applied);
        assert_eq!(router.cache().get(42), Some(&DeviceId::from("dev-B")));
        assert_eq!(fx.audio.assignments().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_assignment_is_retried_next_tick() {
        let fx = Fixture::new();
        let mut router = fx.router(speakers_on_screen1());
        fx.display.focus(42, "Player", Some("Screen1"));
        fx.audio.fail_assignments_for(42);

        assert_eq!(router.tick().await, TickOutcome::Failed);
        assert!(router.cache().get(42).is_none());

        fx.audio.clear_failures();
        assert_eq!(router.tick().await, TickOutcome::Applied);
        assert_eq!(fx.audio.assignments().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_device_is_skipped() {
        let fx = Fixture::new();
        let mut router = fx.router(speakers_on_screen1());
        fx.display.focus(42, "Player", Some("Screen1"));
        fx.audio.remove_device("Speakers");

        assert_eq!(router.tick().await, TickOutcome::DeviceUnavailable);
        assert!(fx.audio.assignments().is_empty());
    }

    #[tokio::test]
    async fn test_prune_stale_pids() {
        let fx = Fixture::new();
        let mut router = fx.router(speakers_on_screen1());
        fx.display.add_window(1, "Background", "Screen1");
        fx.display.focus(2, "Player", Some("Screen1"));
        router.reconcile_all().await;
        assert_eq!(router.cache().len(), 2);

        fx.display.close_process(1);
        assert_eq!(router.prune_stale_pids().await, 1);
        assert!(router.cache().get(1).is_none());
        assert!(router.cache().get(2).is_some());
    }

    #[tokio::test]
    async fn test_start_replace_and_stop() {
        let fx = Fixture::new();
        fx.display.add_window(10, "Background", "Screen2");
        fx.display.focus(42, "Player", Some("Screen1"));

        let handle = fx.router(speakers_on_screen1()).start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Стартовое согласование плюс тики: PID 42 назначен ровно один раз
        assert_eq!(fx.audio.assignments(), vec![(42, DeviceId::from("dev-A"))]);

        let mapping: Mapping = [("Screen1", "Speakers"), ("Screen2", "Headphones")]
            .into_iter()
            .collect();
        handle.replace_mapping(mapping).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let cache = handle.stop().await.unwrap();
        assert_eq!(cache.get(42), Some(&DeviceId::from("dev-A")));
        assert_eq!(cache.get(10), Some(&DeviceId::from("dev-B")));
        assert_eq!(fx.audio.assignments().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_idle_router() {
        let fx = Fixture::new();
        let handle = fx.router(Mapping::new()).start();
        assert!(!handle.is_finished());

        let cache = handle.stop().await.unwrap();
        assert!(cache.is_empty());
        assert!(fx.audio.assignments().is_empty());
    }
}
