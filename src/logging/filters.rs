use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Уровень, на который откатывается некорректная директива.
const FALLBACK_DIRECTIVE: &str = "info";

/// Собирает `EnvFilter`: `RUST_LOG` имеет приоритет, иначе берётся
/// директива из конфигурации.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return env_filter;
    }

    let directive = config.build_filter_directive();
    match EnvFilter::try_new(&directive) {
        Ok(filter) => filter,
        Err(e) => {
            // Подписчик ещё не установлен, поэтому только stderr.
            eprintln!(
                "Invalid log filter directive '{directive}': {e}; falling back to '{FALLBACK_DIRECTIVE}'"
            );
            EnvFilter::new(FALLBACK_DIRECTIVE)
        }
    }
}
