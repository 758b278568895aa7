//! Live notification channels.
//!
//! Each open WebSocket registers a bounded outgoing queue under the
//! authenticated account id. An account may hold several connections (phone
//! and browser); each gets its own id and is removed when its socket closes.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use dashmap::DashMap;
use engine::{NotificationEvent, Notifier};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

pub type ConnectionId = u64;

const DEFAULT_BUFFER: usize = 16;

/// Maps account id to its live connections.
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Vec<(ConnectionId, mpsc::Sender<String>)>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ConnectionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection and return its id with the receiving end of its
    /// queue.
    pub fn register(&self, account_id: Uuid) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .entry(account_id)
            .or_default()
            .push((conn_id, tx));
        tracing::info!(%account_id, conn_id, "notification channel opened");
        (conn_id, rx)
    }

    pub fn remove(&self, account_id: Uuid, conn_id: ConnectionId) {
        let now_empty = match self.connections.get_mut(&account_id) {
            Some(mut senders) => {
                senders.retain(|(id, _)| *id != conn_id);
                senders.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.connections
                .remove_if(&account_id, |_, senders| senders.is_empty());
        }
        tracing::info!(%account_id, conn_id, "notification channel closed");
    }

    pub fn connection_count(&self, account_id: Uuid) -> usize {
        self.connections
            .get(&account_id)
            .map_or(0, |senders| senders.len())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl Notifier for ConnectionRegistry {
    fn notify(&self, account_id: Uuid, event: &NotificationEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!("failed to encode notification: {err}");
                return;
            }
        };

        let mut closed = Vec::new();
        if let Some(senders) = self.connections.get(&account_id) {
            for (conn_id, tx) in senders.iter() {
                match tx.try_send(payload.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(%account_id, conn_id, "notification buffer full, dropping event");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*conn_id),
                }
            }
        } else {
            tracing::debug!(%account_id, "no live connection for notification");
        }

        for conn_id in closed {
            self.remove(account_id, conn_id);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: Option<String>,
}

/// `GET /ws/connect`. The bearer JWT comes from the `Authorization` header
/// or, for browsers, the `token` query parameter.
pub async fn connect(
    ws: WebSocketUpgrade,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<ConnectQuery>,
    State(state): State<ServerState>,
) -> Result<Response, ServerError> {
    let token = match (&bearer, &query.token) {
        (Some(TypedHeader(Authorization(bearer))), _) => bearer.token().to_string(),
        (None, Some(token)) => token.clone(),
        (None, None) => return Err(ServerError::Unauthorized),
    };
    let account = state.keys.verify(&token)?;
    let registry = Arc::clone(&state.registry);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, account.0, registry)))
}

async fn handle_socket(socket: WebSocket, account_id: Uuid, registry: Arc<ConnectionRegistry>) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut rx) = registry.register(account_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Clients only ever close; anything else they send is ignored.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    registry.remove(account_id, conn_id);
}
