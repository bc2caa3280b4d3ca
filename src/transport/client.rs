//! WebSocket client side of the signaling channel

use super::{SignalSink, TransportEvent};
use crate::call::CallError;
use crate::rtc::signaling::SignalingEvent;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// How long `close` waits for queued frames to reach the socket
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection to the relay for one meeting
pub struct SignalingTransport {
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SignalingTransport {
    /// Open the channel. Inbound events are delivered on the returned
    /// receiver in arrival order; frames that do not decode are logged and
    /// skipped.
    pub async fn connect(
        endpoint: &Url,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), CallError> {
        let (ws_stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| CallError::Transport(format!("Failed to connect to {}: {}", endpoint, e)))?;
        info!("Signaling channel open: {}", endpoint);

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let open = Arc::new(AtomicBool::new(true));

        let writer_open = open.clone();
        // Runs until a close frame is written or every sender is gone, so
        // frames queued before the transport is dropped still go out
        let writer = tokio::spawn(async move {
            let mut closed = false;
            while let Some(message) = outbound_rx.recv().await {
                closed = matches!(message, Message::Close(_));
                if let Err(e) = ws_write.send(message).await {
                    warn!("Failed to write to signaling channel: {}", e);
                    closed = true;
                    break;
                }
                if closed {
                    break;
                }
            }
            if !closed {
                if let Err(e) = ws_write.close().await {
                    debug!("Signaling close handshake failed: {}", e);
                }
            }
            writer_open.store(false, Ordering::SeqCst);
        });

        let reader_open = open.clone();
        let reader = tokio::spawn(async move {
            let ending = loop {
                match ws_read.next().await {
                    Some(Ok(Message::Text(text))) => match SignalingEvent::from_json(&text) {
                        Ok(event) => {
                            debug!("Received {} event", event.tag());
                            if inbound_tx.send(TransportEvent::Message(event)).is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("Dropping signaling frame: {}", e),
                    },
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame on signaling channel");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Signaling channel closed by relay");
                        break TransportEvent::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Signaling channel error: {}", e);
                        break TransportEvent::Error(e.to_string());
                    }
                }
            };
            reader_open.store(false, Ordering::SeqCst);
            let _ = inbound_tx.send(ending);
        });

        let transport = Self {
            outbound: outbound_tx,
            open,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        };
        Ok((transport, inbound_rx))
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Flush queued frames, then send a close frame. Later sends are
    /// dropped. Safe to call more than once.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.outbound.send(Message::Close(None));

        let writer = self.writer.lock().take();
        if let Some(mut writer) = writer {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
                warn!("Signaling writer did not finish within {:?}", CLOSE_TIMEOUT);
                writer.abort();
            }
        }

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        info!("Signaling channel closed");
    }
}

impl SignalSink for SignalingTransport {
    fn send(&self, event: &SignalingEvent) {
        if !self.is_open() {
            warn!("Signaling channel not open, dropping {} event", event.tag());
            return;
        }
        match event.to_json() {
            Ok(text) => {
                if self.outbound.send(Message::Text(text)).is_err() {
                    warn!("Signaling writer gone, dropping {} event", event.tag());
                }
            }
            Err(e) => error!("{}", e),
        }
    }
}

impl Drop for SignalingTransport {
    fn drop(&mut self) {
        // The writer is left to drain the queue and exits once the sender
        // goes away with this struct
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}
