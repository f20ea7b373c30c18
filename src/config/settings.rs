use std::{fmt, net::SocketAddr, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use super::Cli;
use crate::{
    error::SettingsError,
    network::ServerConfig,
    poller::PollerConfig,
    pubsub::BrokerConfig,
    source::BustimeConfig,
};

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "BUSFEED";

/// Откуда берутся снимки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// BusTime API по HTTP
    Bustime,
    /// Локальный файл в формате ответа `getvehicles`
    File,
}

/// Подключение к BusTime API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BustimeSettings {
    pub host: Option<String>,
    pub key: Option<String>,
    pub scheme: String,
    pub request_timeout_secs: u64,
}

/// Настройки сервиса.
///
/// Порядок источников: значения по умолчанию, затем окружение
/// (`BUSFEED_SUB_BUFFER`, `BUSFEED_BUSTIME__HOST`, ...), затем флаги
/// командной строки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub listen_address: String,
    pub poll_interval_ms: u64,
    /// Ёмкость почтового ящика подписчика
    pub sub_buffer: usize,
    /// Таймаут записи одного сообщения подписчику, в секундах
    pub sub_timeout_secs: u64,
    pub max_connections: usize,
    pub source: SourceKind,
    pub vehicles_file: Option<PathBuf>,
    pub bustime: BustimeSettings,
}

impl fmt::Debug for BustimeSettings {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BustimeSettings")
            .field("host", &self.host)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("scheme", &self.scheme)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и окружения.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .set_default("listen_address", "127.0.0.1:8080")?
            .set_default("poll_interval_ms", 10_000)?
            .set_default("sub_buffer", 200)?
            .set_default("sub_timeout_secs", 10)?
            .set_default("max_connections", 10_000)?
            .set_default("source", "bustime")?
            .set_default("bustime.scheme", "https")?
            .set_default("bustime.request_timeout_secs", 10)?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }

    /// Окружение плюс флаги командной строки, с проверкой.
    pub fn from_cli(cli: &Cli) -> Result<Self, SettingsError> {
        let mut settings = Self::load()?;
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    /// Флаги командной строки перекрывают всё остальное.
    pub fn apply_cli(
        &mut self,
        cli: &Cli,
    ) {
        if let Some(addr) = &cli.addr {
            self.listen_address = addr.clone();
        }
        if let Some(ms) = cli.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(buffer) = cli.sub_buffer {
            self.sub_buffer = buffer;
        }
        if let Some(secs) = cli.sub_timeout {
            self.sub_timeout_secs = secs;
        }
        if let Some(max) = cli.max_connections {
            self.max_connections = max;
        }
        if let Some(source) = cli.source {
            self.source = source;
        }
        if let Some(path) = &cli.vehicles_file {
            self.vehicles_file = Some(path.clone());
        }
        if let Some(host) = &cli.bustime_host {
            self.bustime.host = Some(host.clone());
        }
        if let Some(key) = &cli.bustime_key {
            self.bustime.key = Some(key.clone());
        }
        if let Some(secs) = cli.request_timeout {
            self.bustime.request_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.listen_addr()?;

        if self.sub_buffer == 0 {
            return Err(SettingsError::invalid("sub_buffer", "must be at least 1"));
        }
        if self.sub_timeout_secs == 0 {
            return Err(SettingsError::invalid("sub_timeout", "must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::invalid("poll_interval_ms", "must be positive"));
        }
        if self.max_connections == 0 {
            return Err(SettingsError::invalid("max_connections", "must be at least 1"));
        }

        match self.source {
            SourceKind::Bustime => {
                if self.bustime.request_timeout_secs == 0 {
                    return Err(SettingsError::invalid("request_timeout", "must be positive"));
                }
                if is_blank(&self.bustime.host) {
                    return Err(SettingsError::MissingBustime("a host", "CLEVER_DEVICES_IP"));
                }
                if is_blank(&self.bustime.key) {
                    return Err(SettingsError::MissingBustime("an API key", "CLEVER_DEVICES_KEY"));
                }
            }
            SourceKind::File => {
                if self.vehicles_file.is_none() {
                    return Err(SettingsError::MissingVehiclesFile);
                }
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.listen_address
            .parse()
            .map_err(|e: std::net::AddrParseError| SettingsError::invalid("addr", e.to_string()))
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            capacity: self.sub_buffer,
            write_timeout: Duration::from_secs(self.sub_timeout_secs),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_connections: self.max_connections,
            ..ServerConfig::default()
        }
    }

    pub fn bustime_config(&self) -> BustimeConfig {
        BustimeConfig {
            host: self.bustime.host.clone().unwrap_or_default(),
            key: self.bustime.key.clone().unwrap_or_default(),
            scheme: self.bustime.scheme.clone(),
            request_timeout: Duration::from_secs(self.bustime.request_timeout_secs),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
