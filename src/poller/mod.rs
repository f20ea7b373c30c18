//! Периодический опрос источника данных с публикацией результата.

use std::{
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use busfeed_error::{Cancelled, ErrorExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{pubsub::Broker, source::DataSource};

/// Интервал опроса по умолчанию.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Получатель опубликованных снимков.
pub trait Publisher<M>: Send + Sync {
    fn publish(
        &self,
        msg: M,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
}

/// Снимок счётчиков опроса.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollerStats {
    /// Вызовы `load`, включая прерванные отменой
    pub attempts: u64,
    pub failures: u64,
    pub publishes: u64,
}

/// Опрашивает источник с фиксированным интервалом и публикует каждый
/// успешно полученный снимок.
///
/// Ошибки загрузки логируются и не прерывают цикл; повторов и backoff нет,
/// следующая попытка будет на следующем тике.
pub struct Poller<M, S, P> {
    source: S,
    publisher: P,
    config: PollerConfig,
    attempts: AtomicU64,
    failures: AtomicU64,
    publishes: AtomicU64,
    _message: PhantomData<fn() -> M>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl<M> Publisher<M> for Broker<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn publish(
        &self,
        msg: M,
    ) {
        Broker::publish(self, msg)
    }
}

impl<M, S, P> Poller<M, S, P>
where
    M: Send + 'static,
    S: DataSource<M>,
    P: Publisher<M>,
{
    pub fn new(
        source: S,
        publisher: P,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            publisher,
            config,
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            publishes: AtomicU64::new(0),
            _message: PhantomData,
        }
    }

    /// Опрашивает источник до отмены `cancel`.
    ///
    /// Первая загрузка выполняется сразу, следующие по таймеру. Загрузка
    /// гонится с отменой, поэтому зависший запрос не задерживает остановку.
    /// Всегда завершается `Err(Cancelled)`.
    pub async fn poll(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        // Нулевой период недопустим для tokio::time::interval.
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?period, "poller started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.poll_once(cancel).await.is_err() {
                break;
            }
        }

        info!(stats = ?self.stats(), "poller stopped");
        Err(Cancelled)
    }

    /// Одна попытка: загрузка и публикация при успехе.
    async fn poll_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            loaded = self.source.load() => loaded,
        };

        match loaded {
            Ok(msg) => {
                self.publisher.publish(msg);
                self.publishes.fetch_add(1, Ordering::Relaxed);
                debug!("snapshot handed to publisher");
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    error = %err,
                    status = %err.status_code(),
                    retryable = err.status_code().is_retryable(),
                    "poll failed"
                );
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> PollerStats {
        PollerStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
