pub mod delivery;
pub mod fetch;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use delivery::*;
pub use fetch::*;

use crate::{ErrorExt, StatusCode};

/// Операция прервана отменой корневого scope.
///
/// Возвращается циклом опроса при остановке процесса; это штатное
/// завершение, а не сбой.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

impl ErrorExt for Cancelled {
    fn status_code(&self) -> StatusCode {
        StatusCode::Cancelled
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
