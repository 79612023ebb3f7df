use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::transport::{
    FrameSink, FrameStream, TransportConnector, TransportError, TransportPair,
};

/// Scripted connector for deterministic channel tests without sockets.
/// Each accepted dial hands the test a `MockRemote` it can drive like the
/// server side of the channel.
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectScript>>,
    remote_tx: mpsc::UnboundedSender<MockRemote>,
    pub connect_calls: AtomicUsize,
}

enum ConnectScript {
    Accept,
    Refuse(String),
}

impl MockConnector {
    /// Returns the connector plus a receiver yielding one `MockRemote` per
    /// accepted dial.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockRemote>) {
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                remote_tx,
                connect_calls: AtomicUsize::new(0),
            }),
            remote_rx,
        )
    }

    /// Make the next dial fail. Dials with no script entry succeed.
    pub fn refuse_next(&self, reason: &str) {
        self.script
            .lock()
            .push_back(ConnectScript::Refuse(reason.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.connect_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<TransportPair, TransportError> {
        self.connect_calls.fetch_add(1, Ordering::Relaxed);
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(ConnectScript::Accept);
        match next {
            ConnectScript::Refuse(reason) => Err(TransportError::Connect(reason)),
            ConnectScript::Accept => {
                let (pair, remote) = mock_pair();
                let _ = self.remote_tx.send(remote);
                Ok(pair)
            }
        }
    }
}

/// The server end of a mocked channel.
pub struct MockRemote {
    to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl MockRemote {
    pub fn send_frame(&self, json: &str) {
        let _ = self.to_client.send(Ok(json.to_string()));
    }

    pub fn send_error(&self, reason: &str) {
        let _ = self
            .to_client
            .send(Err(TransportError::Io(reason.to_string())));
    }

    /// Close the channel from the server side.
    pub fn close(self) {}
}

/// Build a connected (client pair, server remote).
pub fn mock_pair() -> (TransportPair, MockRemote) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    (
        TransportPair {
            sink: Box::new(MockSink { tx: outbound }),
            stream: Box::new(MockStream { rx: inbound }),
        },
        MockRemote {
            to_client,
            from_client,
        },
    )
}

struct MockSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await
    }
}
