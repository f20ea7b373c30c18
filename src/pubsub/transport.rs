use std::fmt;

use async_trait::async_trait;
use busfeed_error::DeliveryError;
use tokio_util::sync::CancellationToken;

/// Причина закрытия транспорта подписчика.
///
/// Коды совпадают с кодами закрытия WebSocket, чтобы клиент мог одинаково
/// их интерпретировать независимо от транспорта.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Подписка снята вызывающим кодом
    Normal,
    /// Сервер останавливается или клиент ушёл сам
    GoingAway,
    /// Клиент не успевает забирать сообщения
    SlowConsumer,
    /// Ошибка записи
    InternalError,
}

/// Транспорт, через который цикл доставки отправляет сообщения одному
/// удалённому подписчику.
///
/// Брокер не знает ничего о протоколе: ему достаточно записи одного
/// сообщения, закрытия с причиной и сигнала об отключении удалённой
/// стороны. Таймаут записи накладывает вызывающий код.
#[async_trait]
pub trait Transport<M>: Send + Sync + 'static
where
    M: Send + Sync,
{
    /// Отправляет одно сообщение. Никогда не вызывается конкурентно для
    /// одного подписчика.
    async fn write(
        &self,
        msg: &M,
    ) -> Result<(), DeliveryError>;

    /// Закрывает соединение. Должно быть идемпотентным и прерывать
    /// незавершённую запись.
    async fn close(
        &self,
        reason: CloseReason,
    );

    /// Токен, который отменяется, когда удалённая сторона отключилась.
    fn disconnected(&self) -> CancellationToken;
}

impl CloseReason {
    /// Код закрытия в нотации WebSocket (RFC 6455, 7.4.1).
    pub const fn code(self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::GoingAway => 1001,
            CloseReason::SlowConsumer => 1008,
            CloseReason::InternalError => 1011,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            CloseReason::Normal => "subscription closed",
            CloseReason::GoingAway => "server shutting down",
            CloseReason::SlowConsumer => "connection too slow to keep up with messages",
            CloseReason::InternalError => "failed to write message",
        }
    }

    /// Причина закрытия для итоговой ошибки цикла доставки.
    pub fn for_outcome(outcome: &DeliveryError) -> Self {
        match outcome {
            DeliveryError::Evicted => CloseReason::SlowConsumer,
            DeliveryError::Unsubscribed => CloseReason::Normal,
            DeliveryError::Cancelled | DeliveryError::Disconnected => CloseReason::GoingAway,
            DeliveryError::WriteTimeout { .. } | DeliveryError::WriteFailed { .. } => {
                CloseReason::InternalError
            }
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}
