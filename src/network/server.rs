use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use busfeed_error::ErrorExt;
use serde::Serialize;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Semaphore,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{TcpTransport, DEFAULT_CLOSE_TIMEOUT};
use crate::pubsub::Broker;

/// Пауза после ошибки `accept`, чтобы не крутиться в цикле при нехватке
/// дескрипторов.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Конфигурация сервера подписчиков.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Максимальное кол-во одновременных подписчиков
    pub max_connections: usize,
    /// Время на отправку прощального кадра при закрытии
    pub close_timeout: Duration,
    /// Отключить алгоритм Нейгла
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            nodelay: true,
        }
    }
}

/// Принимает соединения и подписывает каждое на брокер, пока не отменён
/// `cancel`.
///
/// После отмены перестаёт принимать соединения и ждёт, пока обработчики
/// уже принятых соединений закончат очистку.
pub async fn run<M>(
    listener: TcpListener,
    broker: Broker<M>,
    config: ServerConfig,
    cancel: CancellationToken,
) -> io::Result<()>
where
    M: Serialize + Clone + Send + Sync + 'static,
{
    let limit = Arc::new(Semaphore::new(config.max_connections.max(1)));
    let mut connections = JoinSet::new();

    info!(addr = %listener.local_addr()?, "accepting subscribers");

    loop {
        let (stream, peer) = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
            warn!(%peer, limit = config.max_connections, "connection limit reached, rejecting");
            drop(stream);
            continue;
        };

        let broker = broker.clone();
        let cancel = cancel.clone();
        connections.spawn(async move {
            handle_connection(stream, peer, broker, config, cancel).await;
            drop(permit);
        });

        while connections.try_join_next().is_some() {}
    }

    info!(active = connections.len(), "stopped accepting subscribers");
    while connections.join_next().await.is_some() {}
    Ok(())
}

/// Обслуживает одно соединение от подписки до итога цикла доставки.
async fn handle_connection<M>(
    stream: TcpStream,
    peer: SocketAddr,
    broker: Broker<M>,
    config: ServerConfig,
    cancel: CancellationToken,
) where
    M: Serialize + Clone + Send + Sync + 'static,
{
    if config.nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
    }

    let transport = Arc::new(TcpTransport::new(stream, peer, config.close_timeout));
    let subscription = broker.subscribe(&cancel, transport);
    let id = subscription.id();
    info!(%peer, subscriber = %id, "subscriber connected");

    let outcome = subscription.wait().await;
    if outcome.is_graceful() {
        info!(%peer, subscriber = %id, reason = %outcome, "subscriber disconnected");
    } else {
        warn!(
            %peer,
            subscriber = %id,
            reason = %outcome,
            status = %outcome.status_code(),
            "subscriber dropped"
        );
    }
}
