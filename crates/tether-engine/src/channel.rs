use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tether_core::errors::EngineError;
use tether_core::frames::{ClientFrame, ServerFrame};
use tether_core::ids::SessionId;
use tether_core::status::ConnectionStatus;
use tether_telemetry::EngineMetrics;

use crate::dispatch::{self, FrameOutcome};
use crate::transport::{FrameSink, FrameStream, TransportConnector, TransportPair};
use crate::SharedStore;

const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 10_000;

/// Backoff before reconnect attempt N (1-based): 1s, 2s, 4s, 8s, then
/// capped at 10s.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let ms = if attempt >= 5 {
        MAX_DELAY_MS
    } else {
        BASE_DELAY_MS << (attempt - 1)
    };
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

/// Owns the realtime channel lifecycle: dialing, the reader/writer tasks,
/// closure detection and reconnect scheduling. Connection status, typing
/// state and the error slot are all reported into the shared store.
///
/// At most one reconnect timer is pending at a time; it is an owned task
/// handle, aborted by a successful connect, a superseding schedule, or
/// shutdown. Shutdown is the only way reconnect attempts stop before
/// success.
pub struct ChannelManager {
    url: String,
    connector: Arc<dyn TransportConnector>,
    store: SharedStore,
    metrics: Arc<EngineMetrics>,
    refresh_tx: mpsc::UnboundedSender<SessionId>,
    shutdown: AtomicBool,
    inner: Mutex<ChannelInner>,
    // Handed to spawned tasks so the reconnect loop can re-enter connect().
    weak: Weak<ChannelManager>,
}

#[derive(Default)]
struct ChannelInner {
    outbound: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl ChannelManager {
    pub fn new(
        url: String,
        connector: Arc<dyn TransportConnector>,
        store: SharedStore,
        metrics: Arc<EngineMetrics>,
        refresh_tx: mpsc::UnboundedSender<SessionId>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            url,
            connector,
            store,
            metrics,
            refresh_tx,
            shutdown: AtomicBool::new(false),
            inner: Mutex::new(ChannelInner::default()),
            weak: weak.clone(),
        })
    }

    /// Open the channel. Idempotent: a channel that is already connected or
    /// connecting is left alone. A failed dial schedules a retry (a dial
    /// failure produces no close event, so it must reschedule itself).
    pub async fn connect(&self) {
        if self.is_shutdown() {
            return;
        }
        {
            let status = self.store.lock().connection_status();
            if matches!(
                status,
                ConnectionStatus::Connected | ConnectionStatus::Connecting
            ) {
                return;
            }
        }
        self.cancel_reconnect_timer();
        self.store
            .lock()
            .set_connection_status(ConnectionStatus::Connecting);

        match self.connector.connect(&self.url).await {
            Ok(pair) => self.install(pair),
            Err(e) => {
                tracing::warn!("realtime dial failed: {e}");
                let err = EngineError::WebsocketError(e.to_string());
                {
                    let mut store = self.store.lock();
                    store.set_connection_status(ConnectionStatus::Error);
                    store.clear_typing();
                    store.set_active_stream(None);
                    store.report_error(&err);
                }
                self.schedule_reconnect();
            }
        }
    }

    /// Manual reconnect action: reset the backoff counter and dial now.
    pub async fn reconnect_now(&self) {
        self.store.lock().reset_reconnect_attempts();
        self.cancel_reconnect_timer();
        self.connect().await;
    }

    /// Stop the channel and suppress all future reconnects.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        {
            let mut inner = self.inner.lock();
            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            inner.outbound = None;
            if let Some(writer) = inner.writer.take() {
                writer.abort();
            }
            if let Some(reader) = inner.reader.take() {
                reader.abort();
            }
        }
        self.store
            .lock()
            .set_connection_status(ConnectionStatus::Disconnected);
        tracing::info!("realtime channel shut down");
    }

    /// Queue an outbound frame. Fails when the channel is not connected.
    pub fn send_frame(&self, frame: &ClientFrame) -> Result<(), EngineError> {
        let json = serde_json::to_string(frame)
            .map_err(|e| EngineError::WebsocketMessageError(e.to_string()))?;
        let inner = self.inner.lock();
        match &inner.outbound {
            Some(tx) if tx.send(json).is_ok() => Ok(()),
            _ => Err(EngineError::WebsocketError(
                "realtime channel is not connected".into(),
            )),
        }
    }

    fn strong(&self) -> Arc<Self> {
        self.weak
            .upgrade()
            .expect("channel manager dropped while tasks are running")
    }

    fn install(&self, pair: TransportPair) {
        let TransportPair {
            mut sink,
            mut stream,
        } = pair;
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = sink.send(text).await {
                    tracing::warn!("outbound frame failed: {e}");
                    break;
                }
            }
        });

        let manager = self.strong();
        let reader = tokio::spawn(async move {
            while let Some(item) = stream.next_frame().await {
                match item {
                    Ok(text) => manager.handle_frame(&text),
                    Err(e) => {
                        tracing::warn!("realtime channel error: {e}");
                        let err = EngineError::WebsocketError(e.to_string());
                        let mut store = manager.store.lock();
                        store.set_connection_status(ConnectionStatus::Error);
                        store.clear_typing();
                        store.set_active_stream(None);
                        store.report_error(&err);
                        // Reconnect is scheduled by the close that follows.
                    }
                }
            }
            manager.on_closed();
        });

        {
            let mut inner = self.inner.lock();
            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
            inner.outbound = Some(tx);
            inner.writer = Some(writer);
            inner.reader = Some(reader);
        }
        {
            let mut store = self.store.lock();
            store.set_connection_status(ConnectionStatus::Connected);
            store.reset_reconnect_attempts();
            store.clear_error();
        }
        tracing::info!(url = %self.url, "realtime channel connected");
    }

    fn handle_frame(&self, text: &str) {
        self.metrics.record_frame();
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_dropped_frame();
                let err = EngineError::WebsocketMessageError(e.to_string());
                self.store.lock().report_error(&err);
                return;
            }
        };

        let frame_type = frame.frame_type();
        let outcome = {
            let mut store = self.store.lock();
            dispatch::apply_frame(&mut store, frame)
        };
        match outcome {
            Ok(FrameOutcome::Applied) => {}
            Ok(FrameOutcome::Ignored) => {
                self.metrics.record_dropped_frame();
                tracing::debug!(frame_type, "dropped frame for inactive stream");
            }
            Ok(FrameOutcome::SessionRefresh(session_id)) => {
                let _ = self.refresh_tx.send(session_id);
            }
            Err(e) => {
                self.metrics.record_dropped_frame();
                tracing::warn!(frame_type, "ignoring frame: {e}");
            }
        }
    }

    fn on_closed(&self) {
        {
            let mut inner = self.inner.lock();
            inner.outbound = None;
            if let Some(writer) = inner.writer.take() {
                writer.abort();
            }
            inner.reader = None;
        }
        {
            let mut store = self.store.lock();
            store.set_connection_status(ConnectionStatus::Disconnected);
            store.clear_typing();
            store.set_active_stream(None);
        }
        if !self.is_shutdown() {
            tracing::info!("realtime channel closed");
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&self) {
        if self.is_shutdown() {
            return;
        }
        let attempt = {
            let mut store = self.store.lock();
            let attempt = store.begin_reconnect_attempt();
            store.report_error(&EngineError::WebsocketReconnect { attempt });
            attempt
        };
        let delay = reconnect_delay(attempt);
        self.metrics.record_reconnect();
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        let manager = self.strong();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // This timer is no longer pending; do not let connect() abort
            // the task that is about to run it.
            manager.inner.lock().reconnect_timer.take();
            manager.connect().await;
        });

        let mut inner = self.inner.lock();
        if let Some(prev) = inner.reconnect_timer.take() {
            prev.abort();
        }
        inner.reconnect_timer = Some(handle);
    }

    fn cancel_reconnect_timer(&self) {
        if let Some(timer) = self.inner.lock().reconnect_timer.take() {
            timer.abort();
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
