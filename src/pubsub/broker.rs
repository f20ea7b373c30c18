use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{
    subscriber::{DeliveryLoop, StateCell},
    CloseReason, Latest, LatestCache, SubscriberId, SubscriberState, Subscription, Transport,
};

/// Ёмкость почтового ящика по умолчанию.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 200;
/// Таймаут записи одного сообщения по умолчанию.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Параметры брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Ёмкость почтового ящика каждого подписчика
    pub capacity: usize,
    /// Максимальное время записи одного сообщения в транспорт
    pub write_timeout: Duration,
}

/// Снимок счётчиков брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    /// Общее количество вызовов `publish`
    pub publishes: u64,
    /// Сообщения, положенные в почтовые ящики при публикации
    pub enqueued: u64,
    /// Сообщения, успешно записанные в транспорты
    pub delivered: u64,
    /// Вытесненные медленные подписчики
    pub evictions: u64,
    /// Подписчики, получившие закэшированный снимок при подключении
    pub seeded: u64,
    /// Подписчики в реестре на момент снимка
    pub active: usize,
}

/// Брокер широковещательной рассылки последнего снимка.
///
/// Хранит реестр подписчиков и однослотовый кэш последнего сообщения.
/// Публикация никогда не блокируется на подписчиках: сообщение кладётся в
/// каждый почтовый ящик через `try_send`, а подписчик с полным ящиком
/// вытесняется в отдельной задаче.
///
/// Дешёво клонируется; все клоны разделяют одно состояние.
pub struct Broker<M> {
    shared: Arc<Shared<M>>,
}

/// Общее состояние брокера, доступное циклам доставки.
pub(crate) struct Shared<M> {
    config: BrokerConfig,
    /// Реестр подписчиков. Отдельная блокировка от кэша.
    registry: Mutex<HashMap<SubscriberId, Entry<M>>>,
    latest: LatestCache<M>,
    next_id: AtomicU64,
    counters: Counters,
}

/// Запись реестра об одном подписчике.
pub(crate) struct Entry<M> {
    mailbox: mpsc::Sender<M>,
    pub(crate) transport: Arc<dyn Transport<M>>,
    cancel: CancellationToken,
    state: Arc<StateCell>,
}

#[derive(Debug, Default)]
struct Counters {
    publishes: AtomicU64,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    evictions: AtomicU64,
    seeded: AtomicU64,
    active: AtomicUsize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAILBOX_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl<M> Broker<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Создаёт брокер с пустым реестром и пустым кэшем.
    ///
    /// Ёмкость ящика меньше единицы поднимается до единицы.
    pub fn new(config: BrokerConfig) -> Self {
        let config = BrokerConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            shared: Arc::new(Shared {
                config,
                registry: Mutex::new(HashMap::new()),
                latest: LatestCache::new(),
                next_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> BrokerConfig {
        self.shared.config
    }

    /// Регистрирует подписчика и запускает его цикл доставки.
    ///
    /// Токен подписчика является дочерним для `cancel`: отмена родителя
    /// останавливает цикл. Если в кэше есть снимок, он кладётся в ящик
    /// первым (без ожидания; при полном ящике засев пропускается).
    ///
    /// Должен вызываться внутри Tokio runtime.
    pub fn subscribe(
        &self,
        cancel: &CancellationToken,
        transport: Arc<dyn Transport<M>>,
    ) -> Subscription<M> {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.shared.config.capacity);
        let token = cancel.child_token();
        let state = Arc::new(StateCell::new());

        {
            let mut registry = self.shared.registry.lock();
            registry.insert(
                id,
                Entry {
                    mailbox: tx.clone(),
                    transport: Arc::clone(&transport),
                    cancel: token.clone(),
                    state: Arc::clone(&state),
                },
            );
            self.shared.counters.active.store(registry.len(), Ordering::Relaxed);
            state.advance(SubscriberState::Registered);

            // Засев под блокировкой реестра: публикация меняет кэш только
            // под ней же, поэтому засев и рассылка не пересекаются.
            if let Latest::Present(msg) = self.shared.latest.load() {
                match tx.try_send(msg) {
                    Ok(()) => {
                        self.shared.counters.seeded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => trace!(subscriber = %id, "mailbox full, seed skipped"),
                }
            }
        }
        drop(tx);

        debug!(subscriber = %id, "subscriber registered");

        let task = tokio::spawn(
            DeliveryLoop {
                id,
                shared: Arc::clone(&self.shared),
                mailbox: rx,
                transport,
                cancel: token,
                state: Arc::clone(&state),
                write_timeout: self.shared.config.write_timeout,
            }
            .run(),
        );

        Subscription::new(id, state, Arc::clone(&self.shared), task)
    }

    /// Публикует сообщение всем текущим подписчикам.
    ///
    /// Под блокировкой реестра перезаписывает кэш и кладёт сообщение в
    /// каждый ящик через `try_send`. Подписчики с полным ящиком вытесняются
    /// в отдельных задачах после снятия блокировки; публикация не ждёт ни
    /// записи, ни вытеснения.
    ///
    /// Порядок блокировок тот же, что в `subscribe` (реестр, затем кэш):
    /// новый подписчик получает сообщение либо засевом, либо рассылкой, но
    /// не дважды.
    ///
    /// Вытеснение требует Tokio runtime.
    pub fn publish(
        &self,
        msg: M,
    ) {
        self.shared.counters.publishes.fetch_add(1, Ordering::Relaxed);

        let mut slow = Vec::new();
        let mut enqueued = 0u64;
        let subscribers = {
            let registry = self.shared.registry.lock();
            self.shared.latest.store(msg.clone());
            for (id, entry) in registry.iter() {
                match entry.mailbox.try_send(msg.clone()) {
                    Ok(()) => enqueued += 1,
                    Err(TrySendError::Full(_)) => slow.push(*id),
                    // Цикл уже завершается и уберёт себя сам.
                    Err(TrySendError::Closed(_)) => {}
                }
            }
            registry.len()
        };

        self.shared
            .counters
            .enqueued
            .fetch_add(enqueued, Ordering::Relaxed);
        debug!(subscribers, slow = slow.len(), "snapshot published");

        for id in slow {
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                shared.evict(id).await;
            });
        }
    }

    /// Снимает подписку по идентификатору. Неизвестный или уже снятый
    /// идентификатор игнорируется.
    pub async fn unsubscribe(
        &self,
        id: SubscriberId,
    ) {
        if let Some(entry) = self.shared.detach(id, SubscriberState::Unsubscribed) {
            entry.transport.close(CloseReason::Normal).await;
        }
    }

    /// Последнее опубликованное сообщение.
    pub fn latest(&self) -> Latest<M> {
        self.shared.latest.load()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    pub fn contains(
        &self,
        id: SubscriberId,
    ) -> bool {
        self.shared.registry.lock().contains_key(&id)
    }

    pub fn stats(&self) -> BrokerStats {
        let c = &self.shared.counters;
        BrokerStats {
            publishes: c.publishes.load(Ordering::Relaxed),
            enqueued: c.enqueued.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            seeded: c.seeded.load(Ordering::Relaxed),
            active: c.active.load(Ordering::Relaxed),
        }
    }
}

impl<M> Clone for Broker<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> Shared<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Удаляет подписчика из реестра, фиксирует терминальное состояние и
    /// отменяет его токен.
    ///
    /// Возвращает запись только тому, кто удалил её первым: он и закрывает
    /// транспорт. Остальные вызовы получают `None`.
    pub(crate) fn detach(
        &self,
        id: SubscriberId,
        terminal: SubscriberState,
    ) -> Option<Entry<M>> {
        let entry = {
            let mut registry = self.registry.lock();
            let entry = registry.remove(&id)?;
            self.counters.active.store(registry.len(), Ordering::Relaxed);
            entry
        };
        entry.state.advance(terminal);
        entry.cancel.cancel();
        Some(entry)
    }

    async fn evict(
        &self,
        id: SubscriberId,
    ) {
        if let Some(entry) = self.detach(id, SubscriberState::Evicted) {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            info!(subscriber = %id, "evicting slow consumer");
            entry.transport.close(CloseReason::SlowConsumer).await;
        }
    }

    pub(crate) fn record_delivered(&self) {
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
