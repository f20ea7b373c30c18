//! Общие помощники интеграционных тестов.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use busfeed::{CloseReason, DeliveryError, Transport};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Транспорт, который пересылает записанные сообщения в канал теста.
///
/// В режиме `stuck` запись висит до закрытия транспорта: так выглядит
/// клиент, переставший читать сокет.
pub struct ChannelTransport<M> {
    sink: mpsc::UnboundedSender<M>,
    stuck: bool,
    closes: Mutex<Vec<CloseReason>>,
    closed: CancellationToken,
    remote: CancellationToken,
}

impl<M: Clone + Send + Sync + 'static> ChannelTransport<M> {
    fn build(stuck: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<M>) {
        let (sink, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sink,
            stuck,
            closes: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
            remote: CancellationToken::new(),
        });
        (transport, rx)
    }

    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<M>) {
        Self::build(false)
    }

    pub fn stuck() -> (Arc<Self>, mpsc::UnboundedReceiver<M>) {
        Self::build(true)
    }

    pub fn close_reasons(&self) -> Vec<CloseReason> {
        self.closes.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn disconnect(&self) {
        self.remote.cancel();
    }
}

#[async_trait]
impl<M: Clone + Send + Sync + 'static> Transport<M> for ChannelTransport<M> {
    async fn write(
        &self,
        msg: &M,
    ) -> Result<(), DeliveryError> {
        if self.stuck {
            self.closed.cancelled().await;
            return Err(DeliveryError::WriteFailed {
                reason: "closed while writing".to_string(),
            });
        }
        self.sink
            .send(msg.clone())
            .map_err(|_| DeliveryError::Disconnected)
    }

    async fn close(
        &self,
        reason: CloseReason,
    ) {
        let mut closes = self.closes.lock();
        if closes.is_empty() {
            closes.push(reason);
            self.closed.cancel();
        }
    }

    fn disconnected(&self) -> CancellationToken {
        self.remote.clone()
    }
}

/// Ждёт следующее сообщение не дольше секунды.
pub async fn next<M>(rx: &mut mpsc::UnboundedReceiver<M>) -> M {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("transport channel closed")
}

/// Проверяет, что за `window` ничего не пришло.
pub async fn assert_silent<M: std::fmt::Debug>(
    rx: &mut mpsc::UnboundedReceiver<M>,
    window: Duration,
) {
    if let Ok(Some(msg)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected message: {msg:?}");
    }
}

/// Ждёт, пока условие станет истинным, не дольше секунды.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
