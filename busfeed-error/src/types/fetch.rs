use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки загрузки снимка из внешнего источника.
///
/// Никогда не фатальны: цикл опроса логирует их и ждёт следующего тика.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Запрос не удалось выполнить (DNS, соединение, TLS)
    #[error("GET failed: {reason}")]
    Request { reason: String },
    /// Источник не ответил вовремя
    #[error("request timed out")]
    Timeout,
    /// Источник ответил статусом, отличным от 200
    #[error("response returned with status '{status}'")]
    Status { status: u16 },
    /// Тело ответа не удалось разобрать
    #[error("failed to decode response body: {reason}")]
    Decode { reason: String },
    /// Ошибка чтения локального файла со снимком
    #[error("failed to read snapshot file '{path}': {reason}")]
    Io { path: String, reason: String },
}

impl ErrorExt for FetchError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Request { .. } => StatusCode::UpstreamUnavailable,
            Self::Timeout => StatusCode::Timeout,
            Self::Status { .. } => StatusCode::UpstreamStatus,
            Self::Decode { .. } => StatusCode::UpstreamDecode,
            Self::Io { .. } => StatusCode::Io,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "fetch".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Self::Status { status } = self {
            tags.push(("http_status", status.to_string()));
        }
        tags
    }
}
