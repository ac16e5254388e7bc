use std::time::Duration;

use allbox_core::DialogId;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::store::{DeviceStore, KvStorage};

// Reverse proxies in front of the feed drop connections they consider idle.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Dialogs,
    DialogDevices,
    Files,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change notification scoped to a dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub dialog_id: DialogId,
    #[serde(default)]
    pub row: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub dialog_id: DialogId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedMessage {
    Subscribe(SubscribeRequest),
    Change(ChangeEvent),
    Error { message: String },
}

/// Connect to the change feed and stream this dialog's events. The returned
/// receiver yields until the connection drops or the subscriber is dropped.
pub async fn subscribe(
    ws_url: &str,
    dialog_id: &str,
) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, FeedError> {
    let (ws_stream, _) = connect_async(ws_url).await?;
    let (mut write, mut read) = ws_stream.split();

    let subscribe = FeedMessage::Subscribe(SubscribeRequest {
        dialog_id: dialog_id.to_owned(),
    });
    write
        .send(Message::Text(serde_json::to_string(&subscribe)?.into()))
        .await?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let dialog_id = dialog_id.to_owned();

    tokio::spawn(async move {
        // Pong replies queued by the read half are only flushed when the
        // write half sends, so keep a periodic ping going.
        let mut ping_interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        ping_interval.tick().await; // skip first immediate tick

        loop {
            tokio::select! {
                next = read.next() => {
                    let message = match next {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            warn!("change feed receive error: {}", err);
                            break;
                        }
                        None => break,
                    };

                    match message {
                        Message::Text(text) => {
                            match serde_json::from_str::<FeedMessage>(&text) {
                                Ok(FeedMessage::Change(event)) => {
                                    if event_tx.send(event).is_err() {
                                        break;
                                    }
                                }
                                Ok(FeedMessage::Error { message }) => {
                                    warn!("change feed error for {}: {}", dialog_id, message);
                                }
                                Ok(FeedMessage::Subscribe(_)) => {
                                    warn!("unexpected subscribe frame from feed");
                                }
                                Err(err) => {
                                    warn!("failed to decode feed frame: {}", err);
                                }
                            }
                        }
                        Message::Close(_) => break,
                        Message::Ping(_) | Message::Pong(_) | Message::Binary(_)
                        | Message::Frame(_) => {}
                    }
                }
                _ = ping_interval.tick() => {
                    if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!("change feed for {} closed", dialog_id);
    });

    Ok(event_rx)
}

/// Reconciliation landing point: fold a remote change into the local store.
/// Events may arrive in any order and may reference dialogs this device no
/// longer (or does not yet) track; those land as no-ops, never errors.
pub fn apply_change<S: KvStorage>(store: &mut DeviceStore<S>, event: &ChangeEvent) {
    match event.table {
        ChangeTable::Dialogs => {
            if event.kind == ChangeKind::Delete {
                return;
            }
            if let Some(name) = event.row.get("name").and_then(|v| v.as_str()) {
                store.update_dialog_name(&event.dialog_id, name);
            }
            if let Some(at) = event
                .row
                .get("last_activity_at")
                .and_then(|v| v.as_str())
                .and_then(|raw| raw.parse().ok())
            {
                store.update_dialog_activity(&event.dialog_id, at);
            }
        }
        ChangeTable::Files => {
            if event.kind == ChangeKind::Insert {
                let at = event
                    .row
                    .get("uploaded_at")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or_else(Utc::now);
                store.update_dialog_activity(&event.dialog_id, at);
            }
        }
        ChangeTable::Messages => {
            if event.kind == ChangeKind::Insert {
                let at = event
                    .row
                    .get("sent_at")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or_else(Utc::now);
                store.update_dialog_activity(&event.dialog_id, at);
            }
        }
        // Membership changes only affect the remote device count.
        ChangeTable::DialogDevices => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::store::MemoryStorage;

    use super::*;

    #[test]
    fn feed_frames_roundtrip() {
        let event = FeedMessage::Change(ChangeEvent {
            table: ChangeTable::Files,
            kind: ChangeKind::Insert,
            dialog_id: "d1".to_owned(),
            row: serde_json::json!({ "file_name": "notes.txt" }),
        });
        let encoded = serde_json::to_string(&event).unwrap();
        assert!(encoded.contains(r#""type":"Change""#));
        let decoded: FeedMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn change_event_decodes_without_row() {
        let decoded: ChangeEvent = serde_json::from_str(
            r#"{"table": "dialogs", "kind": "update", "dialog_id": "d1"}"#,
        )
        .unwrap();
        assert_eq!(decoded.table, ChangeTable::Dialogs);
        assert!(decoded.row.is_null());
    }

    #[test]
    fn rename_event_updates_local_mirror() {
        let mut store = DeviceStore::new(MemoryStorage::new());
        store.upsert_dialog("d1", "Device 1", Some("Old Name"), None);

        apply_change(
            &mut store,
            &ChangeEvent {
                table: ChangeTable::Dialogs,
                kind: ChangeKind::Update,
                dialog_id: "d1".to_owned(),
                row: serde_json::json!({ "name": "New Name" }),
            },
        );
        assert_eq!(store.dialog_name("d1").as_deref(), Some("New Name"));
    }

    #[test]
    fn events_for_unknown_dialogs_are_tolerated() {
        let mut store = DeviceStore::new(MemoryStorage::new());
        apply_change(
            &mut store,
            &ChangeEvent {
                table: ChangeTable::Messages,
                kind: ChangeKind::Insert,
                dialog_id: "ghost".to_owned(),
                row: serde_json::Value::Null,
            },
        );
        assert!(store.active_dialogs().is_empty());
    }

    #[test]
    fn file_insert_bumps_activity() {
        let mut store = DeviceStore::new(MemoryStorage::new());
        store.upsert_dialog("d1", "Device 1", None, None);
        let before = store.active_dialogs()[0].last_activity_at;

        apply_change(
            &mut store,
            &ChangeEvent {
                table: ChangeTable::Files,
                kind: ChangeKind::Insert,
                dialog_id: "d1".to_owned(),
                row: serde_json::json!({ "uploaded_at": "2099-01-01T00:00:00Z" }),
            },
        );
        let after = store.active_dialogs()[0].last_activity_at;
        assert!(after > before);
    }
}
