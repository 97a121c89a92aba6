//! Subscriber WebSocket endpoint
//!
//! Each connection registers one channel with the hub. A writer task drains
//! the channel into the socket so frames leave in the order they were queued;
//! the read side only handles setting change requests.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use overlay_broadcaster::{BroadcastEvent, BroadcasterError, ClientMessage, Frame};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tracing::{debug, warn};

use crate::context::AppContext;

/// Transport-level cap on one inbound message. Frames over
/// `MAX_CLIENT_FRAME_BYTES` but under this cap are discarded and the
/// connection stays open; a message over this cap cannot be read past, so
/// the connection is dropped.
pub const MAX_WS_MESSAGE_BYTES: usize = 1024 * 1024;

pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> Response {
    ws.max_message_size(MAX_WS_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let id = match ctx.hub.register(tx.clone()).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Failed to register subscriber: {}", e);
            return;
        }
    };

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = ctx.shutdown.cancelled() => break,
        };

        match message {
            Some(Ok(Message::Text(text))) => handle_client_frame(&ctx, &tx, &text).await,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) if is_oversized(&e) => {
                warn!(
                    "Subscriber {} sent a message over {} bytes, closing connection",
                    id, MAX_WS_MESSAGE_BYTES
                );
                break;
            }
            Some(Err(e)) => {
                debug!("Subscriber {} read error: {}", id, e);
                break;
            }
        }
    }

    ctx.hub.unregister(id).await;
    drop(tx);
    writer.abort();
}

fn is_oversized(error: &axum::Error) -> bool {
    std::error::Error::source(error)
        .and_then(|source| source.downcast_ref::<tungstenite::Error>())
        .is_some_and(|e| matches!(e, tungstenite::Error::Capacity(_)))
}

async fn handle_client_frame(ctx: &AppContext, tx: &mpsc::UnboundedSender<Frame>, text: &str) {
    let (name, value) = match ClientMessage::parse(text) {
        Ok(ClientMessage::WhisperingSettingChange { name, value }) => (name, value),
        Err(BroadcasterError::FrameTooLarge { size, limit }) => {
            warn!("Discarding subscriber frame of {} bytes (limit {})", size, limit);
            return;
        }
        Err(e) => {
            warn!("Discarding subscriber frame: {}", e);
            return;
        }
    };

    let success = ctx.control.send_setting(&name, &value).await;
    let response = BroadcastEvent::WhisperingSettingResponse {
        success,
        name,
        value,
    };

    match response.to_frame() {
        Ok(frame) => {
            let _ = tx.send(frame);
        }
        Err(e) => warn!("Failed to encode setting response: {}", e),
    }
}
