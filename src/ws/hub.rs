//! WebSocket Hub implementation
//!
//! Tracks live connections per user code and pushes permission snapshots
//! to them after role or user changes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use dashmap::DashMap;
use futures::{future::join_all, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{bearer_token, load_active_user, verify_token, CurrentUser, TokenKind};
use crate::permission::{PermissionService, UserMenu};
use crate::state::AppState;

/// Server to client messages, serialized as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    #[serde(rename = "connected")]
    Connected(Connected),
    #[serde(rename = "permission:updated")]
    PermissionUpdated(PermissionUpdate),
    #[serde(rename = "error")]
    Error(WsError),
    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub user_code: String,
    pub timestamp: i64,
}

/// Fresh menu snapshot for a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionUpdate {
    #[serde(flatten)]
    pub menu: UserMenu,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WsError {
    pub code: u16,
    pub message: String,
}

/// Client to server messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    #[serde(rename = "ping")]
    Ping,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// WebSocket Hub
pub struct Hub {
    /// Connected clients by user code
    clients: DashMap<String, Vec<mpsc::UnboundedSender<WsMessage>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a new client
    pub fn register(&self, user_code: &str, tx: mpsc::UnboundedSender<WsMessage>) {
        self.clients.entry(user_code.to_string()).or_default().push(tx);
        tracing::debug!("WebSocket client registered for user {}", user_code);
    }

    /// Unregister a client
    pub fn unregister(&self, user_code: &str, tx: &mpsc::UnboundedSender<WsMessage>) {
        if let Some(mut clients) = self.clients.get_mut(user_code) {
            clients.retain(|c| !c.same_channel(tx));
            if clients.is_empty() {
                drop(clients);
                self.clients.remove(user_code);
            }
        }
        tracing::debug!("WebSocket client unregistered for user {}", user_code);
    }

    pub fn is_online(&self, user_code: &str) -> bool {
        self.clients.contains_key(user_code)
    }

    /// Deliver to every connection of a user; returns how many accepted it.
    pub fn send(&self, user_code: &str, msg: &WsMessage) -> usize {
        let Some(clients) = self.clients.get(user_code) else {
            return 0;
        };
        clients.iter().filter(|tx| tx.send(msg.clone()).is_ok()).count()
    }

    /// Recompute and push the menu snapshot of one user.
    ///
    /// Offline users are skipped without touching the stores. Returns whether
    /// anything was sent.
    pub async fn push_permissions(&self, service: &PermissionService, user_code: &str) -> AppResult<bool> {
        if !self.is_online(user_code) {
            tracing::debug!("User {} is offline, skipping permission push", user_code);
            return Ok(false);
        }

        let menu = service.user_menu(user_code).await?;
        let msg = WsMessage::PermissionUpdated(PermissionUpdate {
            menu,
            timestamp: now_millis(),
        });
        let delivered = self.send(user_code, &msg);
        tracing::info!("Pushed permissions to user {} ({} connections)", user_code, delivered);
        Ok(delivered > 0)
    }

    /// Push to several users concurrently. A failure for one user is logged
    /// and does not stop the others.
    pub async fn push_permissions_to_users(&self, service: &PermissionService, user_codes: &[String]) {
        let pushes = user_codes.iter().map(|code| async move {
            if let Err(e) = self.push_permissions(service, code).await {
                tracing::warn!("Permission push to user {} failed: {}", code, e);
            }
        });
        join_all(pushes).await;
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

async fn authenticate(state: &AppState, query: &WsQuery, headers: &HeaderMap) -> AppResult<CurrentUser> {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(headers))
        .ok_or_else(|| AppError::Unauthorized("missing token".to_string()))?;
    let claims = verify_token(&state.config.jwt, token, TokenKind::Access)?;
    let model = load_active_user(state.db.as_ref(), &claims.user_code).await?;
    Ok(CurrentUser::from(model))
}

/// WebSocket upgrade handler
///
/// Authentication failures still complete the upgrade so the client receives
/// an `error` message before the socket closes.
pub async fn serve_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let auth = authenticate(&state, &query, &headers).await;
    ws.on_upgrade(move |socket| async move {
        match auth {
            Ok(user) => handle_socket(socket, state, user).await,
            Err(e) => reject_socket(socket, e).await,
        }
    })
}

async fn reject_socket(mut socket: WebSocket, err: AppError) {
    tracing::debug!("WebSocket authentication failed: {}", err);
    let msg = WsMessage::Error(WsError {
        code: 401,
        message: err.to_string(),
    });
    if let Ok(text) = serde_json::to_string(&msg) {
        let _ = socket.send(Message::Text(text)).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, user: CurrentUser) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    state.hub.register(&user.user_code, tx.clone());
    let _ = tx.send(WsMessage::Connected(Connected {
        user_code: user.user_code.clone(),
        timestamp: now_millis(),
    }));

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode WebSocket message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let tx_clone = tx.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                        let _ = tx_clone.send(WsMessage::Pong);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.hub.unregister(&user.user_code, &tx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::service::tests::{menu_store, service, strings};

    #[test]
    fn test_register_and_unregister() {
        let hub = Hub::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        hub.register("u1", tx1.clone());
        hub.register("u1", tx2.clone());
        assert!(hub.is_online("u1"));
        assert_eq!(hub.send("u1", &WsMessage::Pong), 2);

        hub.unregister("u1", &tx1);
        assert!(hub.is_online("u1"));
        hub.unregister("u1", &tx2);
        assert!(!hub.is_online("u1"));
        assert_eq!(hub.send("u1", &WsMessage::Pong), 0);
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(WsMessage::Pong).unwrap();
        assert_eq!(json["type"], "pong");

        let msg = WsMessage::PermissionUpdated(PermissionUpdate {
            menu: UserMenu {
                permissions: Vec::new(),
                button_permissions: vec!["b".to_string()],
            },
            timestamp: 7,
        });
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["type"], "permission:updated");
        assert_eq!(json["data"]["buttonPermissions"][0], "b");
        assert_eq!(json["data"]["timestamp"], 7);
        assert!(json["data"]["permissions"].is_array());
    }

    #[test]
    fn test_client_ping_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"other"}"#).is_err());
    }

    #[tokio::test]
    async fn test_push_skips_offline_users() {
        let mut store = menu_store();
        store.fail = true;
        let svc = service(store);
        let hub = Hub::new();

        // offline users never reach the failing store
        assert!(!hub.push_permissions(&svc, "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_push_delivers_snapshot() {
        let mut store = menu_store();
        store.grants.insert("staff".to_string(), strings(&["system:user"]));
        store.users.insert("u1".to_string(), strings(&["staff"]));
        let svc = service(store);

        let hub = Hub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("u1", tx);

        assert!(hub.push_permissions(&svc, "u1").await.unwrap());
        match rx.recv().await {
            Some(WsMessage::PermissionUpdated(update)) => {
                assert_eq!(update.menu.permissions[0].codes(), vec!["system", "system:user"]);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_push_tolerates_failures() {
        let mut store = menu_store();
        store.grants.insert("staff".to_string(), strings(&["system"]));
        store.users.insert("u1".to_string(), strings(&["staff"]));
        store.users.insert("u2".to_string(), strings(&["staff"]));
        store.fail = true;
        let svc = service(store);

        let hub = Hub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register("u1", tx1);
        hub.register("u2", tx2);

        hub.push_permissions_to_users(&svc, &strings(&["u1", "u2", "offline"])).await;
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
    }
}
