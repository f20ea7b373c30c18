use std::{
    marker::PhantomData,
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use busfeed_error::DeliveryError;
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::Mutex,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::pubsub::{CloseReason, Transport};

/// Таймаут отправки прощального кадра по умолчанию.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Транспорт подписчика поверх TCP: одно сообщение на строку JSON.
///
/// Входящие данные клиента читаются и отбрасываются; конец потока или
/// ошибка чтения отменяют токен `disconnected`. При закрытии клиенту
/// отправляется строка `{"close":{"code":..,"reason":..}}`.
pub struct TcpTransport<M> {
    peer: SocketAddr,
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Отменяется при `close`, прерывает незавершённую запись
    closing: CancellationToken,
    /// Отменяется, когда клиент отключился
    remote: CancellationToken,
    closed: AtomicBool,
    close_timeout: Duration,
    _message: PhantomData<fn(&M)>,
}

#[derive(Serialize)]
struct CloseFrame<'a> {
    close: CloseBody<'a>,
}

#[derive(Serialize)]
struct CloseBody<'a> {
    code: u16,
    reason: &'a str,
}

impl<M> TcpTransport<M>
where
    M: Serialize + Send + Sync + 'static,
{
    /// Разделяет поток и запускает задачу, следящую за отключением клиента.
    ///
    /// Должен вызываться внутри Tokio runtime.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        close_timeout: Duration,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let closing = CancellationToken::new();
        let remote = CancellationToken::new();

        tokio::spawn(watch_remote(
            read_half,
            peer,
            closing.clone(),
            remote.clone(),
        ));

        Self {
            peer,
            writer: Mutex::new(Some(write_half)),
            closing,
            remote,
            closed: AtomicBool::new(false),
            close_timeout,
            _message: PhantomData,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Читает и отбрасывает входящие строки, пока клиент не отключится или
/// транспорт не закроют.
async fn watch_remote(
    read_half: OwnedReadHalf,
    peer: SocketAddr,
    closing: CancellationToken,
    remote: CancellationToken,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = closing.cancelled() => return,
            read = reader.read_line(&mut line) => read,
        };
        match read {
            Ok(0) => {
                debug!(%peer, "peer closed connection");
                break;
            }
            Ok(n) => trace!(%peer, bytes = n, "ignoring inbound data"),
            Err(e) => {
                debug!(%peer, error = %e, "read from peer failed");
                break;
            }
        }
    }
    remote.cancel();
}

#[async_trait]
impl<M> Transport<M> for TcpTransport<M>
where
    M: Serialize + Send + Sync + 'static,
{
    async fn write(
        &self,
        msg: &M,
    ) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(msg).map_err(|e| DeliveryError::WriteFailed {
            reason: format!("serialize: {e}"),
        })?;
        line.push(b'\n');

        let mut guard = tokio::select! {
            biased;
            _ = self.closing.cancelled() => return Err(transport_closed()),
            guard = self.writer.lock() => guard,
        };
        let writer = guard.as_mut().ok_or_else(transport_closed)?;

        tokio::select! {
            biased;
            _ = self.closing.cancelled() => Err(transport_closed()),
            written = writer.write_all(&line) => written.map_err(|e| DeliveryError::WriteFailed {
                reason: e.to_string(),
            }),
        }
    }

    async fn close(
        &self,
        reason: CloseReason,
    ) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closing.cancel();

        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };

        let frame = CloseFrame {
            close: CloseBody {
                code: reason.code(),
                reason: reason.as_str(),
            },
        };
        let farewell = async {
            let mut line = serde_json::to_vec(&frame)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(())
        };

        match timeout(self.close_timeout, farewell).await {
            Ok(Ok(())) => debug!(peer = %self.peer, %reason, "transport closed"),
            Ok(Err(e)) => debug!(peer = %self.peer, error = %e, "close frame not delivered"),
            Err(_) => debug!(peer = %self.peer, "close frame timed out"),
        }
    }

    fn disconnected(&self) -> CancellationToken {
        self.remote.clone()
    }
}

fn transport_closed() -> DeliveryError {
    DeliveryError::WriteFailed {
        reason: "transport closed".to_string(),
    }
}
