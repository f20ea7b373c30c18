use std::{any::Any, time::Duration};

use crate::{ErrorExt, StatusCode};

/// Причина завершения цикла доставки одного подписчика.
///
/// Возвращается через подписку вызывающему коду (обработчику соединения),
/// который решает, считать ли это обычным отключением или сбоем.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Запись не уложилась в отведённый таймаут
    #[error("write timed out after {timeout:?}")]
    WriteTimeout { timeout: Duration },
    /// Транспорт вернул ошибку записи
    #[error("write messages failed: {reason}")]
    WriteFailed { reason: String },
    /// Удалённая сторона закрыла соединение
    #[error("remote peer disconnected")]
    Disconnected,
    /// Брокер отключил медленного подписчика
    #[error("connection too slow to keep up with messages")]
    Evicted,
    /// Подписка снята вызывающим кодом
    #[error("subscription disposed")]
    Unsubscribed,
    /// Отменён корневой scope
    #[error("delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    /// Штатное завершение: отмена, отписка или отключение клиента.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Unsubscribed | Self::Cancelled
        )
    }
}

impl ErrorExt for DeliveryError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::WriteTimeout { .. } => StatusCode::WriteTimeout,
            Self::WriteFailed { .. } => StatusCode::Io,
            Self::Disconnected => StatusCode::ConnectionClosed,
            Self::Evicted => StatusCode::SlowConsumer,
            Self::Unsubscribed => StatusCode::Success,
            Self::Cancelled => StatusCode::Cancelled,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::WriteFailed { .. } => "Write failed".to_string(),
            other => other.to_string(),
        }
    }
}
