//! Per-task event stream
//!
//! Forwards every `TaskEvent` published for the task as a JSON text frame.
//! Client text frames are acknowledged with `{"type":"ack","data":...}`.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

const MAX_INPUT_SIZE: usize = 64 * 1024;

pub async fn handler(
    ws: WebSocketUpgrade,
    Path(task_id): Path<i64>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, task_id, state))
}

fn ack(data: &str) -> Message {
    let msg = serde_json::json!({ "type": "ack", "data": data });
    Message::Text(msg.to_string())
}

async fn handle_socket(socket: WebSocket, task_id: i64, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let mut events = state.events.subscribe(task_id);
    tracing::debug!(task_id, "Event stream opened");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(task_id, error = %e, "Failed to encode event");
                            continue;
                        }
                    };
                    if ws_sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(task_id, skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > MAX_INPUT_SIZE {
                        tracing::warn!(task_id, "Rejected oversized WebSocket message ({} bytes)", text.len());
                        continue;
                    }
                    if ws_sink.send(ack(&text)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(task_id, "Event stream closed");
}
