use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Переменная окружения с уровнем (или директивой) логирования.
pub const ENV_LOG_LEVEL: &str = "BUSFEED_LOG_LEVEL";
/// Переменная окружения с форматом вывода.
pub const ENV_LOG_FORMAT: &str = "BUSFEED_LOG_FORMAT";
/// Переменная окружения с каталогом логов; включает запись в файл.
pub const ENV_LOG_DIR: &str = "BUSFEED_LOG_DIR";

/// Формат строк лога.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Настройки вывода в консоль.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
    /// Формат консоли, если отличается от общего
    pub format: Option<LogFormat>,
}

/// Настройки записи в файл (ежедневная ротация).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub enabled: bool,
    /// Префикс имени файла; к нему добавляется дата
    pub filename: String,
    pub format: LogFormat,
}

/// Конфигурация подсистемы логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Уровень или директива `EnvFilter`, например `info` или
    /// `busfeed=debug,reqwest=warn`
    pub level: String,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoggingConfigError {
    #[error("log level must not be empty")]
    EmptyLevel,
    #[error("log file name must not be empty")]
    EmptyFilename,
    #[error("both console and file sinks are disabled")]
    NoSinks,
    #[error("unknown log format '{0}' (expected compact, pretty or json)")]
    UnknownFormat(String),
}

impl FromStr for LogFormat {
    type Err = LoggingConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingConfigError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        };
        f.write_str(s)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
            format: None,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: "busfeed.log".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            log_dir: PathBuf::from("logs"),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// Значения по умолчанию с переопределениями из окружения.
    pub fn from_env() -> Result<Self, LoggingConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Применяет `BUSFEED_LOG_LEVEL`, `BUSFEED_LOG_FORMAT` и
    /// `BUSFEED_LOG_DIR`. Заданный каталог включает запись в файл.
    pub fn apply_env_overrides(&mut self) -> Result<(), LoggingConfigError> {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                self.level = level.trim().to_string();
            }
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            self.format = format.parse()?;
        }
        if let Ok(dir) = env::var(ENV_LOG_DIR) {
            if !dir.trim().is_empty() {
                self.log_dir = PathBuf::from(dir);
                self.file.enabled = true;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LoggingConfigError> {
        if self.level.trim().is_empty() {
            return Err(LoggingConfigError::EmptyLevel);
        }
        if self.file.enabled && self.file.filename.trim().is_empty() {
            return Err(LoggingConfigError::EmptyFilename);
        }
        if !self.console.enabled && !self.file.enabled {
            return Err(LoggingConfigError::NoSinks);
        }
        Ok(())
    }

    /// Создаёт каталог логов, если включена запись в файл.
    pub fn ensure_log_dir(&self) -> std::io::Result<()> {
        if self.file.enabled {
            std::fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    pub fn build_filter_directive(&self) -> String {
        self.level.trim().to_string()
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }

    pub fn log_file_path(&self) -> PathBuf {
        Path::new(&self.log_dir).join(&self.file.filename)
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn clear_env() {
        env::remove_var(ENV_LOG_LEVEL);
        env::remove_var(ENV_LOG_FORMAT);
        env::remove_var(ENV_LOG_DIR);
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LoggingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.console_format(), LogFormat::Compact);
        assert!(!config.file.enabled);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingConfigError::UnknownFormat(_))
        ));
    }

    /// Тест проверяет переопределения из окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var(ENV_LOG_LEVEL, "busfeed=debug");
        env::set_var(ENV_LOG_FORMAT, "json");
        env::set_var(ENV_LOG_DIR, "/tmp/busfeed-logs");

        let config = LoggingConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.build_filter_directive(), "busfeed=debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.file.enabled);
        assert_eq!(
            config.log_file_path(),
            PathBuf::from("/tmp/busfeed-logs/busfeed.log")
        );
    }

    #[test]
    #[serial]
    fn test_bad_env_format_is_rejected() {
        clear_env();
        env::set_var(ENV_LOG_FORMAT, "yaml");
        let result = LoggingConfig::from_env();
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_no_sinks() {
        let mut config = LoggingConfig::default();
        config.console.enabled = false;
        assert_eq!(config.validate(), Err(LoggingConfigError::NoSinks));
    }

    #[test]
    fn test_console_format_override() {
        let mut config = LoggingConfig {
            format: LogFormat::Json,
            ..Default::default()
        };
        assert_eq!(config.console_format(), LogFormat::Json);
        config.console.format = Some(LogFormat::Pretty);
        assert_eq!(config.console_format(), LogFormat::Pretty);
    }
}
