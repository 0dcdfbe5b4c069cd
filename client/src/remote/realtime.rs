//! Change feeds over the Phoenix-framed realtime websocket.

use std::time::Duration;

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use super::{ChangeEvent, ChangeFeed, ChangeKind, Table};
use crate::error::RemoteError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

fn topic(table: Table) -> String {
    format!("realtime:public:{}", table.name())
}

fn join_message(table: Table) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic(table),
        event: "phx_join".into(),
        payload: json!({
            "config": {
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": table.name() }
                ]
            }
        }),
        reference: Some("1".into()),
    }
}

fn heartbeat_message(reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".into(),
        event: "heartbeat".into(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

/// Decode a frame into a change on `table`. Replies, heartbeats and changes
/// to other tables yield `None`.
fn parse_change(frame: &str, table: Table) -> Option<ChangeEvent> {
    let msg: PhoenixMessage = serde_json::from_str(frame).ok()?;
    if msg.event != "postgres_changes" {
        return None;
    }
    let data = msg.payload.get("data")?;
    if data.get("table").and_then(Value::as_str) != Some(table.name()) {
        return None;
    }
    let kind = data
        .get("type")
        .and_then(Value::as_str)
        .and_then(ChangeKind::parse)?;
    let record = data
        .get("record")
        .filter(|r| !r.is_null())
        .or_else(|| data.get("old_record"))
        .cloned()
        .unwrap_or(Value::Null);
    Some(ChangeEvent { table, kind, record })
}

fn encode(msg: &PhoenixMessage) -> Result<Message, RemoteError> {
    Ok(Message::Text(serde_json::to_string(msg)?.into()))
}

/// Open a socket, join the table's channel and forward its changes. The
/// socket task ends when the feed is dropped or the server goes away.
pub async fn subscribe(url: &str, table: Table) -> Result<ChangeFeed, RemoteError> {
    let (socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| RemoteError::Transport(e.to_string()))?;
    let (mut sink, mut frames) = socket.split();
    sink.send(encode(&join_message(table))?)
        .await
        .map_err(|e| RemoteError::Transport(e.to_string()))?;

    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut reference = 1u64;
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if tx.is_closed() {
                        break;
                    }
                    reference += 1;
                    let Ok(frame) = encode(&heartbeat_message(reference)) else { break };
                    if let Err(e) = sink.send(frame).await {
                        tracing::warn!("{} feed heartbeat failed: {e}", table.name());
                        break;
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(change) = parse_change(text.as_str(), table) {
                            if tx.unbounded_send(change).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("{} feed closed: {e}", table.name());
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
        tracing::debug!("{} feed ended", table.name());
    });
    Ok(rx.boxed())
}
