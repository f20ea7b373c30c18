use std::sync::Arc;

use async_trait::async_trait;
use busfeed_error::DeliveryError;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{CloseReason, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ok,
    Stalled,
    Failing,
}

/// Транспорт для тестов: запоминает записанные сообщения и причины
/// закрытия.
pub(crate) struct RecordingTransport<M> {
    mode: Mode,
    written: Mutex<Vec<M>>,
    closes: Mutex<Vec<CloseReason>>,
    closed: CancellationToken,
    remote: CancellationToken,
}

impl<M: Clone + Send + Sync + 'static> RecordingTransport<M> {
    fn with_mode(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            written: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
            remote: CancellationToken::new(),
        })
    }

    pub(crate) fn new() -> Arc<Self> {
        Self::with_mode(Mode::Ok)
    }

    /// Запись висит, пока транспорт не закроют.
    pub(crate) fn stalled() -> Arc<Self> {
        Self::with_mode(Mode::Stalled)
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::with_mode(Mode::Failing)
    }

    pub(crate) fn written(&self) -> Vec<M> {
        self.written.lock().clone()
    }

    pub(crate) fn close_reasons(&self) -> Vec<CloseReason> {
        self.closes.lock().clone()
    }

    pub(crate) fn disconnect(&self) {
        self.remote.cancel();
    }
}

#[async_trait]
impl<M: Clone + Send + Sync + 'static> Transport<M> for RecordingTransport<M> {
    async fn write(
        &self,
        msg: &M,
    ) -> Result<(), DeliveryError> {
        match self.mode {
            Mode::Ok => {
                self.written.lock().push(msg.clone());
                Ok(())
            }
            Mode::Stalled => {
                self.closed.cancelled().await;
                Err(DeliveryError::WriteFailed {
                    reason: "transport closed".to_string(),
                })
            }
            Mode::Failing => Err(DeliveryError::WriteFailed {
                reason: "broken pipe".to_string(),
            }),
        }
    }

    async fn close(
        &self,
        reason: CloseReason,
    ) {
        if !self.closed.is_cancelled() {
            self.closes.lock().push(reason);
            self.closed.cancel();
        }
    }

    fn disconnected(&self) -> CancellationToken {
        self.remote.clone()
    }
}
