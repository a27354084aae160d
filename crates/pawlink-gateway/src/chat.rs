use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use pawlink_db::Database;
use pawlink_db::models::{AppendOutcome, MarkReadOutcome};
use pawlink_types::api::{ConversationDetail, ConversationSummary};
use pawlink_types::events::{MessageView, ServerEvent};
use pawlink_types::models::{Actor, ActorProfile, ChatMessage, Conversation};

use crate::error::ServiceError;
use crate::registry::Registry;
use crate::{blocking, now};

pub const MAX_MESSAGE_CHARS: usize = 4000;

/// One-to-one conversations between any two actors.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
    registry: Registry,
}

impl ChatService {
    pub fn new(db: Arc<Database>, registry: Registry) -> Self {
        Self { db, registry }
    }

    /// The conversation between `a` and `b`, created on first use. Concurrent
    /// calls for the same pair, in either order, return the same conversation.
    pub async fn find_or_create(&self, a: Actor, b: Actor) -> Result<Conversation, ServiceError> {
        if a.id == b.id {
            return Err(ServiceError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let lookup = blocking(&self.db, move |db| {
            db.find_or_create_conversation(Uuid::new_v4(), &[a, b], now())
        })
        .await?;

        if lookup.created {
            info!(
                "Conversation {} started between {} and {}",
                lookup.conversation.id,
                a.key(),
                b.key()
            );
        }
        Ok(lookup.conversation)
    }

    /// Persist a message, then push it. Delivery never changes the result.
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: Actor,
        content: &str,
    ) -> Result<ChatMessage, ServiceError> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(ServiceError::Validation("message content is empty".into()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ServiceError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let outcome = blocking(&self.db, move |db| {
            db.append_message(Uuid::new_v4(), conversation_id, sender, &content, now())
        })
        .await?;

        let (message, conversation) = match outcome {
            AppendOutcome::Appended {
                message,
                conversation,
            } => (message, conversation),
            AppendOutcome::MissingConversation => return Err(ServiceError::NotFound("conversation")),
            AppendOutcome::NotParticipant => return Err(ServiceError::Forbidden),
        };

        debug!("{} appended message {} to {}", sender.key(), message.id, conversation.id);
        self.push_new_message(&conversation, &message).await;
        Ok(message)
    }

    async fn push_new_message(&self, conversation: &Conversation, message: &ChatMessage) {
        let sender = message.sender;
        let profile = match blocking(&self.db, move |db| db.resolve_profiles(&[sender])).await {
            Ok(mut profiles) => profiles.pop().unwrap_or_else(|| ActorProfile::unknown(sender)),
            Err(e) => {
                warn!("Could not resolve sender {}: {}", sender.id, e);
                ActorProfile::unknown(sender)
            }
        };

        let view = MessageView {
            message: message.clone(),
            sender_name: profile.display_name.clone(),
            sender_avatar: profile.avatar.clone(),
        };

        for other in conversation.others(sender.id) {
            let delivered = self
                .registry
                .send(
                    other.id,
                    ServerEvent::NewMessage {
                        conversation_id: conversation.id,
                        message: view.clone(),
                    },
                )
                .await;
            if !delivered {
                debug!("{} offline, message {} left unread", other.id, message.id);
                continue;
            }
            self.registry
                .send(
                    other.id,
                    ServerEvent::NewMessageNotification {
                        conversation_id: conversation.id,
                        sender_id: sender.id,
                        sender_name: profile.display_name.clone(),
                        content: message.content.clone(),
                        timestamp: message.created_at,
                    },
                )
                .await;
        }

        self.registry
            .send(
                sender.id,
                ServerEvent::MessageSent {
                    conversation_id: conversation.id,
                    message: view,
                },
            )
            .await;
    }

    /// Mark every message the reader did not send as read. Returns how many changed.
    pub async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<usize, ServiceError> {
        let outcome = blocking(&self.db, move |db| {
            db.mark_conversation_read(conversation_id, reader_id)
        })
        .await?;

        let (conversation, updated) = match outcome {
            MarkReadOutcome::Marked {
                conversation,
                updated,
            } => (conversation, updated),
            MarkReadOutcome::MissingConversation => return Err(ServiceError::NotFound("conversation")),
            MarkReadOutcome::NotParticipant => return Err(ServiceError::Forbidden),
        };

        if updated > 0 {
            for other in conversation.others(reader_id) {
                self.registry
                    .send(
                        other.id,
                        ServerEvent::MessagesRead {
                            conversation_id,
                            reader_id,
                        },
                    )
                    .await;
            }
        }
        Ok(updated)
    }

    pub async fn unread_count_for(&self, actor_id: Uuid) -> Result<u64, ServiceError> {
        blocking(&self.db, move |db| db.unread_count_for(actor_id)).await
    }

    pub async fn list_conversations_for(&self, actor_id: Uuid) -> Result<Vec<ConversationSummary>, ServiceError> {
        blocking(&self.db, move |db| {
            let overviews = db.conversations_for(actor_id)?;
            let counterparts: Vec<Actor> = overviews
                .iter()
                .filter_map(|o| {
                    o.conversation
                        .others(actor_id)
                        .next()
                        .or_else(|| o.conversation.participants.first())
                        .copied()
                })
                .collect();
            let profiles = db.resolve_profiles(&counterparts)?;

            Ok(overviews
                .into_iter()
                .zip(profiles)
                .map(|(overview, participant)| ConversationSummary {
                    id: overview.conversation.id,
                    participant,
                    last_message: overview.last_message,
                    last_activity_at: overview.conversation.last_activity_at,
                    unread_count: overview.unread,
                })
                .collect())
        })
        .await
    }

    /// Full history for a participant. Opening a conversation reads it.
    pub async fn open_conversation(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<ConversationDetail, ServiceError> {
        let conversation = self.ensure_participant(conversation_id, reader_id).await?;
        self.mark_read(conversation_id, reader_id).await?;

        let participants = conversation.participants.clone();
        let (profiles, messages) = blocking(&self.db, move |db| {
            Ok((db.resolve_profiles(&participants)?, db.messages_for(conversation_id)?))
        })
        .await?;

        let by_id: HashMap<Uuid, &ActorProfile> = profiles.iter().map(|p| (p.id, p)).collect();
        let messages = messages
            .into_iter()
            .map(|message| {
                let (sender_name, sender_avatar) = match by_id.get(&message.sender.id) {
                    Some(p) => (p.display_name.clone(), p.avatar.clone()),
                    None => (message.sender.kind.fallback_name().to_string(), None),
                };
                MessageView {
                    message,
                    sender_name,
                    sender_avatar,
                }
            })
            .collect();

        Ok(ConversationDetail {
            conversation,
            participants: profiles,
            messages,
        })
    }

    /// The conversation, if it exists and `actor_id` takes part in it.
    pub async fn ensure_participant(&self, conversation_id: Uuid, actor_id: Uuid) -> Result<Conversation, ServiceError> {
        let conversation = blocking(&self.db, move |db| db.get_conversation(conversation_id))
            .await?
            .ok_or(ServiceError::NotFound("conversation"))?;
        if !conversation.has_participant(actor_id) {
            return Err(ServiceError::Forbidden);
        }
        Ok(conversation)
    }

    /// Forward a typing indicator to participants looking at the conversation.
    pub async fn relay_typing(&self, conversation_id: Uuid, actor_id: Uuid, is_typing: bool) -> Result<(), ServiceError> {
        let conversation = self.ensure_participant(conversation_id, actor_id).await?;
        for other in conversation.others(actor_id) {
            self.registry
                .send_if_viewing(
                    other.id,
                    conversation_id,
                    ServerEvent::Typing {
                        conversation_id,
                        user_id: actor_id,
                        is_typing,
                    },
                )
                .await;
        }
        Ok(())
    }
}
