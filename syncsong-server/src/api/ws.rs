//! Room WebSocket
//!
//! Each connection gets an unbounded outbound queue drained by its own
//! writer task, so a slow socket never holds the registry lock.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use syncsong_common::time::now_millis;
use syncsong_common::SyncEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::server::AppContext;
use crate::error::Result;
use crate::room::validate_code;

/// GET /ws/:code
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse> {
    validate_code(&code)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, code, ctx)))
}

async fn handle_socket(socket: WebSocket, code: String, ctx: AppContext) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut queue) = mpsc::unbounded_channel::<SyncEvent>();

    let id = ctx.registry.join(&code, outbox).await;

    // Ends when the registry drops this participant's outbox
    let writer = tokio::spawn(async move {
        while let Some(event) = queue.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {}: {}", event.tag(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match SyncEvent::from_json(&text) {
                Ok(command) => {
                    if let Err(e) = ctx
                        .registry
                        .handle_command(&code, id, command, now_millis())
                        .await
                    {
                        warn!("Room {}: rejected command from {}: {}", code, id, e);
                    }
                }
                Err(e) => warn!("Room {}: dropping malformed frame from {}: {}", code, id, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Room {}: socket error for {}: {}", code, id, e);
                break;
            }
        }
    }

    ctx.registry.leave(&code, id).await;
    if let Err(e) = writer.await {
        debug!("Writer task for {} ended abnormally: {}", id, e);
    }
}
