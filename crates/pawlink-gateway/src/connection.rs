use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use pawlink_types::api::Claims;
use pawlink_types::events::{ClientFrame, ServerEvent};
use pawlink_types::models::Actor;

use crate::chat::ChatService;
use crate::error::{AuthError, ServiceError};
use crate::registry::Registry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Everything a socket loop needs, cloned into each connection.
#[derive(Clone)]
pub struct Gateway {
    pub registry: Registry,
    pub chat: ChatService,
    jwt_secret: Arc<str>,
}

impl Gateway {
    pub fn new(registry: Registry, chat: ChatService, jwt_secret: &str) -> Self {
        Self {
            registry,
            chat,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}

/// Verify a bearer token and return its claims.
pub fn authenticate(token: Option<&str>, jwt_secret: &str) -> Result<Claims, AuthError> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Invalid,
    })
}

/// Run one upgraded WebSocket: authenticate, register, then pump frames both
/// ways until either side goes away or a newer connection replaces this one.
pub async fn handle_socket(socket: WebSocket, token: Option<String>, gateway: Gateway) {
    let (mut sender, mut receiver) = socket.split();

    let claims = match authenticate(token.as_deref(), &gateway.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("WebSocket handshake rejected: {}", e);
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: e.close_code(),
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let actor = claims.actor();
    info!("{} ({} {}) connected to gateway", claims.name, actor.kind, actor.id);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let registration = gateway.registry.register(actor, tx.clone()).await;
    let conn_id = registration.conn_id;

    let online = ServerEvent::OnlineUsers {
        users: gateway.registry.online_actors().await,
    };
    if !send_event(&mut sender, &online).await {
        gateway.registry.unregister(actor.id, conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();
    let cancel = registration.cancel.clone();

    // Registry events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "replaced by a newer connection".into(),
                        })))
                        .await;
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Client frames -> services
    let gateway_recv = gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => handle_frame(&gateway_recv, actor, conn_id, &tx, frame).await,
                    Err(e) => {
                        warn!("{} bad frame ({} bytes): {}", actor.id, text.len(), e);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    gateway.registry.unregister(actor.id, conn_id).await;
    info!("{} ({}) disconnected from gateway", claims.name, actor.id);
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

/// Run one frame. Failures are answered with an `error` frame on this
/// connection and never end it.
async fn handle_frame(
    gateway: &Gateway,
    actor: Actor,
    conn_id: Uuid,
    reply: &mpsc::UnboundedSender<ServerEvent>,
    frame: ClientFrame,
) {
    let kind = frame.kind();
    trace!("{} -> {}", actor.id, kind);

    if let Err(e) = dispatch(gateway, actor, conn_id, reply, frame).await {
        match &e {
            ServiceError::Storage(err) => error!("{} from {} failed: {:#}", kind, actor.id, err),
            other => debug!("{} from {} rejected: {}", kind, actor.id, other),
        }
        let _ = reply.send(ServerEvent::Error {
            code: e.code().to_string(),
            message: e.client_message(),
        });
    }
}

async fn dispatch(
    gateway: &Gateway,
    actor: Actor,
    conn_id: Uuid,
    reply: &mpsc::UnboundedSender<ServerEvent>,
    frame: ClientFrame,
) -> Result<(), ServiceError> {
    match frame {
        ClientFrame::ChatMessage {
            conversation_id,
            content,
        } => {
            gateway
                .chat
                .append_message(conversation_id, actor, &content)
                .await?;
        }

        ClientFrame::Typing {
            conversation_id,
            is_typing,
        } => {
            gateway
                .chat
                .relay_typing(conversation_id, actor.id, is_typing)
                .await?;
        }

        ClientFrame::OpenConversation { conversation_id } => {
            gateway.chat.ensure_participant(conversation_id, actor.id).await?;
            gateway
                .registry
                .set_viewing(actor.id, conn_id, Some(conversation_id))
                .await;
        }

        ClientFrame::CloseConversation => {
            gateway.registry.set_viewing(actor.id, conn_id, None).await;
        }

        ClientFrame::CheckOnline { actor_id } => {
            let is_online = gateway.registry.is_online(actor_id).await;
            let _ = reply.send(ServerEvent::OnlineStatus { actor_id, is_online });
        }

        ClientFrame::MarkMessagesRead { conversation_id } => {
            gateway.chat.mark_read(conversation_id, actor.id).await?;
        }

        ClientFrame::GetUnreadCount => {
            let count = gateway.chat.unread_count_for(actor.id).await?;
            let _ = reply.send(ServerEvent::UnreadCount { count });
        }
    }
    Ok(())
}
