use std::path::PathBuf;

use clap::Parser;

use super::SourceKind;
use crate::logging::{LogFormat, LoggingConfig};

/// Аргументы командной строки `busfeed`.
///
/// Все флаги необязательны: незаданный флаг не перекрывает значение из
/// окружения или значение по умолчанию.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "busfeed")]
#[command(author = "busfeed contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Polls live vehicle positions and streams every snapshot to subscribers", long_about = None)]
pub struct Cli {
    /// Адрес для подписчиков
    #[arg(long, help = "Адрес, на котором принимаются подписчики [по умолчанию: 127.0.0.1:8080]")]
    pub addr: Option<String>,
    /// Интервал опроса в миллисекундах
    #[arg(long, help = "Интервал опроса источника в миллисекундах [по умолчанию: 10000]")]
    pub poll_interval_ms: Option<u64>,
    /// Ёмкость почтового ящика подписчика
    #[arg(long, help = "Сколько снимков может ждать отправки одному подписчику [по умолчанию: 200]")]
    pub sub_buffer: Option<usize>,
    /// Таймаут записи подписчику в секундах
    #[arg(long, help = "Таймаут записи одного снимка подписчику в секундах [по умолчанию: 10]")]
    pub sub_timeout: Option<u64>,
    #[arg(long, help = "Максимальное кол-во одновременных подписчиков")]
    pub max_connections: Option<usize>,
    /// Источник снимков
    #[arg(long, value_enum, help = "Источник снимков [по умолчанию: bustime]")]
    pub source: Option<SourceKind>,
    #[arg(long, help = "Файл с ответом getvehicles для источника file")]
    pub vehicles_file: Option<PathBuf>,
    /// Ключ BusTime API
    #[arg(
        long,
        env = "CLEVER_DEVICES_KEY",
        hide_env_values = true,
        help = "Ключ BusTime API"
    )]
    pub bustime_key: Option<String>,
    /// Хост BusTime API
    #[arg(long, env = "CLEVER_DEVICES_IP", help = "Хост BusTime API")]
    pub bustime_host: Option<String>,
    #[arg(long, help = "Таймаут HTTP-запроса к BusTime в секундах [по умолчанию: 10]")]
    pub request_timeout: Option<u64>,
    /// Уровень логирования
    #[arg(long, help = "Уровень или директива логирования, например info или busfeed=debug")]
    pub log_level: Option<String>,
    #[arg(long, help = "Формат логов: compact, pretty или json")]
    pub log_format: Option<LogFormat>,
    #[arg(long, help = "Каталог для файловых логов (включает запись в файл)")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    /// Флаги логирования перекрывают окружение.
    pub fn apply_logging(
        &self,
        config: &mut LoggingConfig,
    ) {
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.format = format;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
            config.file.enabled = true;
        }
    }
}
