use anyhow::{Context, Result};
use busfeed::{
    config::{Cli, Settings, SourceKind},
    logging::{self, LoggingConfig},
    network,
    poller::{Poller, PollerConfig, PollerStats},
    pubsub::Broker,
    source::{BustimeClient, DataSource, FileSource, VehicleSnapshot},
};
use clap::Parser;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::from_env().context("invalid logging environment")?;
    cli.apply_logging(&mut log_config);
    let logging = logging::init_logging(log_config).map_err(|e| anyhow::anyhow!(e))?;

    let settings = Settings::from_cli(&cli).context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_COMMIT"),
        built = env!("BUILD_TIME"),
        host = %hostname::get().map(|h| h.to_string_lossy().into_owned()).unwrap_or_default(),
        pid = std::process::id(),
        ?settings,
        "busfeed starting"
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            cancel.cancel();
        }
    });

    let broker = Broker::<VehicleSnapshot>::new(settings.broker_config());
    let listener = TcpListener::bind(settings.listen_addr()?)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_address))?;

    let poller = match settings.source {
        SourceKind::Bustime => {
            let client = BustimeClient::new(&settings.bustime_config())
                .context("failed to build BusTime client")?;
            info!(endpoint = %client.endpoint(), "polling BusTime API");
            spawn_poller(client, broker.clone(), settings.poller_config(), cancel.clone())
        }
        SourceKind::File => {
            let path = settings
                .vehicles_file
                .clone()
                .context("file source requires --vehicles-file")?;
            info!(path = %path.display(), "polling local snapshot file");
            spawn_poller(
                FileSource::new(path),
                broker.clone(),
                settings.poller_config(),
                cancel.clone(),
            )
        }
    };

    let served = network::run(
        listener,
        broker.clone(),
        settings.server_config(),
        cancel.clone(),
    )
    .await;
    // Сервер может упасть раньше сигнала: останавливаем и опрос.
    cancel.cancel();

    let poller_stats = poller.await.context("poller task failed")?;
    info!(broker = ?broker.stats(), poller = ?poller_stats, "busfeed stopped");

    logging.shutdown();
    served.context("subscriber server failed")
}

/// Запускает опрос источника до отмены и возвращает итоговые счётчики.
fn spawn_poller<S>(
    source: S,
    broker: Broker<VehicleSnapshot>,
    config: PollerConfig,
    cancel: CancellationToken,
) -> JoinHandle<PollerStats>
where
    S: DataSource<VehicleSnapshot> + 'static,
{
    tokio::spawn(async move {
        let poller = Poller::<VehicleSnapshot, _, _>::new(source, broker, config);
        let _cancelled = poller.poll(&cancel).await;
        poller.stats()
    })
}

/// Ждёт Ctrl-C или SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
