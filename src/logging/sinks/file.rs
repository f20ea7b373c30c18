use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::LoggingConfig,
    formatter::{self, FormatOptions},
};

/// Файловый слой с ежедневной ротацией и неблокирующей записью.
///
/// Возвращённый `WorkerGuard` должен жить до конца работы процесса,
/// иначе хвост лога потеряется.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> std::io::Result<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.log_dir)?;

    let appender = rolling::daily(&config.log_dir, &config.file.filename);
    let (writer, guard) = non_blocking(appender);

    let options = FormatOptions {
        with_ansi: false,
        with_target: true,
        with_thread_ids: config.console.with_thread_ids,
        with_line_numbers: config.console.with_line_numbers,
    };
    let layer = formatter::build_formatter(config.file.format, options, writer);

    Ok((layer, guard))
}
