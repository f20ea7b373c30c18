//! Ошибки запуска сервиса.
//!
//! Ошибки рабочего цикла (загрузка, доставка) живут в крейте
//! `busfeed-error` и переэкспортируются отсюда.

pub use busfeed_error::{Cancelled, DeliveryError, ErrorExt, FetchError, StatusCode};
use thiserror::Error;

/// Неверная конфигурация при старте. Единственная фатальная ошибка
/// сервиса.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    #[error("Bustime source requires {0} (set {1})")]
    MissingBustime(&'static str, &'static str),

    #[error("File source requires --vehicles-file")]
    MissingVehiclesFile,
}

impl SettingsError {
    pub fn invalid(
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl ErrorExt for SettingsError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidArgs
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
