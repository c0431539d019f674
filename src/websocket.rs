use crate::error::{AppError, AppResult};
use crate::notifications::{DealNotification, NotificationSink};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Messages clients send to manage their rooms
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinDeal { deal_id: Uuid },
    LeaveDeal { deal_id: Uuid },
    JoinUser { user_id: Uuid },
}

impl ClientMessage {
    fn room(&self) -> String {
        match self {
            ClientMessage::JoinDeal { deal_id } | ClientMessage::LeaveDeal { deal_id } => {
                format!("deal:{}", deal_id)
            }
            ClientMessage::JoinUser { user_id } => format!("user:{}", user_id),
        }
    }
}

/// Room-scoped WebSocket fan-out of deal notifications
#[derive(Clone)]
pub struct WebSocketServer {
    tx: broadcast::Sender<DealNotification>,
    /// room -> clients
    rooms: Arc<RwLock<HashMap<String, HashSet<Uuid>>>>,
    /// client -> rooms
    client_rooms: Arc<RwLock<HashMap<Uuid, HashSet<String>>>>,
}

impl WebSocketServer {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);

        Self {
            tx,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            client_rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<DealNotification> {
        self.tx.subscribe()
    }

    pub async fn join_room(&self, client_id: Uuid, room: String) {
        let mut rooms = self.rooms.write().await;
        let mut client_rooms = self.client_rooms.write().await;

        rooms.entry(room.clone()).or_default().insert(client_id);
        client_rooms.entry(client_id).or_default().insert(room.clone());

        debug!("Client {} joined {}", client_id, room);
    }

    pub async fn leave_room(&self, client_id: Uuid, room: &str) {
        let mut rooms = self.rooms.write().await;
        let mut client_rooms = self.client_rooms.write().await;

        if let Some(members) = rooms.get_mut(room) {
            members.remove(&client_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        if let Some(joined) = client_rooms.get_mut(&client_id) {
            joined.remove(room);
        }

        debug!("Client {} left {}", client_id, room);
    }

    /// Drop every room membership of a client
    pub async fn disconnect(&self, client_id: Uuid) {
        let joined = {
            let mut client_rooms = self.client_rooms.write().await;
            client_rooms.remove(&client_id).unwrap_or_default()
        };
        for room in joined {
            self.leave_room(client_id, &room).await;
        }
    }

    pub async fn is_in_room(&self, client_id: Uuid, room: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|members| members.contains(&client_id))
            .unwrap_or(false)
    }

    pub async fn room_size(&self, room: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(HashSet::len).unwrap_or(0)
    }

    /// Accept connections until the listener fails
    pub async fn run(self, listener: TcpListener) -> AppResult<()> {
        loop {
            let (stream, addr) = listener
                .accept()
                .await
                .map_err(|e| AppError::Message(format!("WebSocket accept failed: {}", e)))?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!("WebSocket connection from {} failed: {}", addr, e);
                }
            });
        }
    }

    /// Number of live connections receiving notifications
    pub fn connection_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Serve one client until it closes; the forwarder dies with it
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (ws_sender, mut ws_receiver) = ws_stream.split();
        let ws_sender = Arc::new(Mutex::new(ws_sender));
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
        });
        if let Err(e) = ws_sender.lock().await.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        let server = self.clone();
        let sink = Arc::clone(&ws_sender);
        let forwarder = tokio::spawn(async move {
            loop {
                let notification = match rx.recv().await {
                    Ok(n) => n,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, {} notifications dropped", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !server.is_in_room(client_id, &notification.room()).await {
                    continue;
                }

                let json = match serde_json::to_string(&notification) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize notification: {}", e);
                        continue;
                    }
                };

                if let Err(e) = sink.lock().await.send(Message::Text(json)).await {
                    debug!("Stopped forwarding to client {}: {}", client_id, e);
                    break;
                }
            }
        });

        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(request) => {
                            let room = request.room();
                            let ack = match request {
                                ClientMessage::LeaveDeal { .. } => {
                                    self.leave_room(client_id, &room).await;
                                    "left"
                                }
                                _ => {
                                    self.join_room(client_id, room.clone()).await;
                                    "joined"
                                }
                            };
                            serde_json::json!({ "type": ack, "room": room })
                        }
                        Err(_) => {
                            warn!("Failed to parse message from client {}: {}", client_id, text);
                            serde_json::json!({
                                "type": "error",
                                "message": "Invalid message format"
                            })
                        }
                    };

                    let mut outbound = ws_sender.lock().await;
                    if let Err(e) = outbound.send(Message::Text(reply.to_string())).await {
                        warn!("Failed to reply to client {}: {}", client_id, e);
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket connection closed: {}", client_id);
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        forwarder.abort();
        self.disconnect(client_id).await;

        // Flushes the queued close reply so the handshake completes
        if let Err(e) = ws_sender.lock().await.close().await {
            debug!("Close for client {} did not complete: {}", client_id, e);
        }

        Ok(())
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for WebSocketServer {
    fn notify(&self, notification: DealNotification) {
        let room = notification.room();
        match self.tx.send(notification) {
            Ok(receivers) => debug!("Queued notification for {} ({} connections)", room, receivers),
            // No connected clients
            Err(_) => debug!("Dropped notification for {}: nobody listening", room),
        }
    }
}
