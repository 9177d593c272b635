//! WebSocket transport.
//!
//! Serves the device channel on `/`. Each socket gets a bounded outbound
//! queue drained by a writer task; the queue's sender is the socket's
//! [`DeviceSink`], so a slow socket only ever blocks its own sends.

use crate::dispatcher::DeviceSink;
use crate::Coordinator;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use unison_core::error::Result;
use unison_core::SendError;

/// Frames queued per socket before senders wait.
const OUTBOUND_QUEUE: usize = 256;

/// Interval between keepalive pings.
const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Outbound queue of one socket.
#[derive(Debug, Clone)]
pub struct WsSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl WsSink {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl DeviceSink for WsSink {
    async fn send_text(&self, text: Arc<str>) -> std::result::Result<(), SendError> {
        self.tx.send(text).await.map_err(|_| SendError::Closed)
    }

    fn try_send_text(&self, text: Arc<str>) -> std::result::Result<(), SendError> {
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// Router serving the device channel on `/`.
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(coordinator)
}

/// Serve connections from `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, coordinator: Arc<Coordinator>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on ws://{}", addr);
    }
    let app = router(coordinator).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(coordinator): State<Arc<Coordinator>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator, addr))
}

async fn handle_socket(socket: WebSocket, coordinator: Arc<Coordinator>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(OUTBOUND_QUEUE);

    let writer = tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(PING_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await;
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(text) = frame else { break };
                    if sender.send(Message::Text(String::from(&*text).into())).await.is_err() {
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let id = coordinator.connect(Arc::new(WsSink::new(tx))).await;
    tracing::debug!("{} is {}", id, addr);

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => coordinator.handle_text(&id, text.as_str()).await,
            Ok(Message::Binary(data)) => {
                coordinator
                    .reject(&id, format!("unexpected {}-byte binary frame", data.len()))
                    .await
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                coordinator.registry().touch(&id);
            }
            Err(e) => {
                tracing::debug!("Socket error from {}: {}", id, e);
                break;
            }
        }
    }

    coordinator.disconnect(&id).await;
    writer.abort();
}
