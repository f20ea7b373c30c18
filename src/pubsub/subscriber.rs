use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use busfeed_error::DeliveryError;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{broker::Shared, CloseReason, Transport};

/// Идентификатор подписчика, уникальный в пределах одного брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

/// Жизненный цикл подписчика.
///
/// Терминальные состояния (`Unsubscribed`, `Evicted`, `Errored`,
/// `Cancelled`) взаимоисключающие: фиксируется первое достигнутое.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Created = 0,
    Registered = 1,
    Delivering = 2,
    Unsubscribed = 3,
    Evicted = 4,
    Errored = 5,
    Cancelled = 6,
}

/// Атомарная ячейка состояния, общая для брокера, цикла доставки и
/// дескриптора подписки.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

/// Дескриптор подписки, который возвращает [`Broker::subscribe`].
///
/// Удаление дескриптора не снимает подписку: цикл доставки живёт до
/// отписки, вытеснения, ошибки записи или отмены.
///
/// [`Broker::subscribe`]: super::Broker::subscribe
pub struct Subscription<M> {
    id: SubscriberId,
    state: Arc<StateCell>,
    shared: Arc<Shared<M>>,
    task: JoinHandle<DeliveryError>,
}

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl SubscriberState {
    pub fn is_terminal(self) -> bool {
        self as u8 >= SubscriberState::Unsubscribed as u8
    }

    /// Терминальное состояние для итоговой ошибки цикла доставки.
    pub fn for_outcome(outcome: &DeliveryError) -> Self {
        match outcome {
            DeliveryError::Evicted => SubscriberState::Evicted,
            DeliveryError::Unsubscribed => SubscriberState::Unsubscribed,
            DeliveryError::Cancelled | DeliveryError::Disconnected => SubscriberState::Cancelled,
            DeliveryError::WriteTimeout { .. } | DeliveryError::WriteFailed { .. } => {
                SubscriberState::Errored
            }
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SubscriberState::Created,
            1 => SubscriberState::Registered,
            2 => SubscriberState::Delivering,
            3 => SubscriberState::Unsubscribed,
            4 => SubscriberState::Evicted,
            5 => SubscriberState::Errored,
            _ => SubscriberState::Cancelled,
        }
    }
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(SubscriberState::Created as u8))
    }

    pub(crate) fn get(&self) -> SubscriberState {
        SubscriberState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Переводит подписчика вперёд по жизненному циклу.
    ///
    /// Возвращает `false`, если состояние уже терминальное или переход
    /// ведёт назад. Из терминального состояния выхода нет.
    pub(crate) fn advance(
        &self,
        next: SubscriberState,
    ) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = SubscriberState::from_u8(current);
            if state.is_terminal() || (!next.is_terminal() && current >= next as u8) {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Итог цикла доставки, когда его остановили извне.
    fn stop_reason(&self) -> DeliveryError {
        match self.get() {
            SubscriberState::Evicted => DeliveryError::Evicted,
            SubscriberState::Unsubscribed => DeliveryError::Unsubscribed,
            _ => DeliveryError::Cancelled,
        }
    }
}

impl<M> Subscription<M>
where
    M: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        id: SubscriberId,
        state: Arc<StateCell>,
        shared: Arc<Shared<M>>,
        task: JoinHandle<DeliveryError>,
    ) -> Self {
        Self {
            id,
            state,
            shared,
            task,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> SubscriberState {
        self.state.get()
    }

    /// Цикл доставки уже завершился.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Снимает подписку: удаляет из реестра, останавливает цикл доставки и
    /// закрывает транспорт с причиной `Normal`.
    ///
    /// Повторный вызов, как и вызов после вытеснения, ничего не делает.
    pub async fn unsubscribe(&self) {
        if let Some(entry) = self.shared.detach(self.id, SubscriberState::Unsubscribed) {
            entry.transport.close(CloseReason::Normal).await;
        }
    }

    /// Ждёт завершения цикла доставки и возвращает его итог.
    pub async fn wait(self) -> DeliveryError {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => DeliveryError::Cancelled,
            Err(err) => {
                warn!(subscriber = %self.id, error = %err, "delivery task panicked");
                DeliveryError::WriteFailed {
                    reason: "delivery task panicked".to_string(),
                }
            }
        }
    }
}

impl<M> fmt::Debug for Subscription<M> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Цикл доставки
////////////////////////////////////////////////////////////////////////////////

/// Всё, что нужно циклу доставки одного подписчика.
pub(crate) struct DeliveryLoop<M> {
    pub(crate) id: SubscriberId,
    pub(crate) shared: Arc<Shared<M>>,
    pub(crate) mailbox: mpsc::Receiver<M>,
    pub(crate) transport: Arc<dyn Transport<M>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Arc<StateCell>,
    pub(crate) write_timeout: Duration,
}

impl<M> DeliveryLoop<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Забирает сообщения из почтового ящика по одному и пишет их в
    /// транспорт, пока что-нибудь не остановит цикл.
    ///
    /// Каждая запись ограничена `write_timeout` и прерывается отменой
    /// токена подписчика. При выходе подписчик удаляется из реестра, а
    /// транспорт закрывается тем, кто удалил его первым.
    pub(crate) async fn run(mut self) -> DeliveryError {
        let remote = self.transport.disconnected();
        debug!(subscriber = %self.id, "delivery loop started");

        let outcome = loop {
            let msg = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break self.state.stop_reason(),
                _ = remote.cancelled() => break DeliveryError::Disconnected,
                next = self.mailbox.recv() => match next {
                    Some(msg) => msg,
                    None => break self.state.stop_reason(),
                },
            };

            self.state.advance(SubscriberState::Delivering);

            let write = tokio::time::timeout(self.write_timeout, self.transport.write(&msg));
            let written = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break self.state.stop_reason(),
                written = write => written,
            };

            match written {
                Ok(Ok(())) => {
                    trace!(subscriber = %self.id, "message written");
                    self.shared.record_delivered();
                }
                Ok(Err(err)) => break err,
                Err(_) => {
                    break DeliveryError::WriteTimeout {
                        timeout: self.write_timeout,
                    }
                }
            }
        };

        if let Some(entry) = self
            .shared
            .detach(self.id, SubscriberState::for_outcome(&outcome))
        {
            entry.transport.close(CloseReason::for_outcome(&outcome)).await;
        }

        if outcome.is_graceful() {
            debug!(subscriber = %self.id, reason = %outcome, "delivery loop finished");
        } else {
            warn!(subscriber = %self.id, reason = %outcome, "delivery loop failed");
        }

        outcome
    }
}
