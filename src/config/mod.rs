//! Конфигурация сервиса: значения по умолчанию, окружение и флаги
//! командной строки.

pub mod cli;
pub mod settings;

pub use cli::Cli;
pub use settings::*;
