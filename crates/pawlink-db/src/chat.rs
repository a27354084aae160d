use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use pawlink_types::models::{Actor, ChatMessage, Conversation};

use crate::models::{AppendOutcome, ConversationLookup, ConversationOverview, MarkReadOutcome};
use crate::{Database, OptionalExt, text_col, ts};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_kind, content, created_at, read";

/// Canonical, order-independent key for a participant set.
pub fn participant_key(participants: &[Actor]) -> String {
    let mut keys: Vec<String> = participants.iter().map(Actor::key).collect();
    keys.sort();
    keys.dedup();
    keys.join("|")
}

impl Database {
    // -- Conversations --

    /// Returns the conversation for exactly this participant set, creating it
    /// under `id` if none exists. Lookup and insert share one transaction and
    /// `participant_key` is UNIQUE, so concurrent callers converge on one row.
    pub fn find_or_create_conversation(
        &self,
        id: Uuid,
        participants: &[Actor],
        now: DateTime<Utc>,
    ) -> Result<ConversationLookup> {
        let key = participant_key(participants);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM conversations WHERE participant_key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;

            let (conversation_id, created) = match existing {
                Some(existing_id) => (existing_id, false),
                None => {
                    let new_id = id.to_string();
                    tx.execute(
                        "INSERT INTO conversations (id, participant_key, created_at, last_activity_at)
                         VALUES (?1, ?2, ?3, ?3)",
                        params![new_id, key, ts(now)],
                    )?;
                    for (position, actor) in participants.iter().enumerate() {
                        tx.execute(
                            "INSERT INTO conversation_participants (conversation_id, actor_id, actor_kind, position)
                             VALUES (?1, ?2, ?3, ?4)",
                            params![new_id, actor.id.to_string(), actor.kind.as_str(), position as i64],
                        )?;
                    }
                    (new_id, true)
                }
            };

            let conversation = query_conversation(&tx, &conversation_id)?
                .ok_or_else(|| anyhow!("Conversation vanished: {}", conversation_id))?;
            tx.commit()?;

            Ok(ConversationLookup {
                conversation,
                created,
            })
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, &id.to_string()))
    }

    /// Conversations the actor takes part in, most recent activity first.
    pub fn conversations_for(&self, actor_id: Uuid) -> Result<Vec<ConversationOverview>> {
        self.with_conn(|conn| {
            let aid = actor_id.to_string();
            let mut stmt = conn.prepare(
                "SELECT c.id FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.actor_id = ?1
                 ORDER BY c.last_activity_at DESC, c.created_at DESC",
            )?;
            let ids = stmt
                .query_map([&aid], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut overviews = Vec::with_capacity(ids.len());
            for id in ids {
                let Some(conversation) = query_conversation(conn, &id)? else {
                    continue;
                };
                let last_message = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT 1",
                            MESSAGE_COLUMNS
                        ),
                        [&id],
                        map_message,
                    )
                    .optional()?;
                let unread: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM messages
                     WHERE conversation_id = ?1 AND read = 0 AND sender_id != ?2",
                    params![id, aid],
                    |row| row.get(0),
                )?;
                overviews.push(ConversationOverview {
                    conversation,
                    last_message,
                    unread: unread as u64,
                });
            }

            Ok(overviews)
        })
    }

    // -- Messages --

    /// Appends a message and bumps `last_activity_at` in one transaction.
    pub fn append_message(
        &self,
        message_id: Uuid,
        conversation_id: Uuid,
        sender: Actor,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let cid = conversation_id.to_string();

            let Some(conversation) = query_conversation(&tx, &cid)? else {
                return Ok(AppendOutcome::MissingConversation);
            };
            if !conversation.has_participant(sender.id) {
                return Ok(AppendOutcome::NotParticipant);
            }

            let mid = message_id.to_string();
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, sender_kind, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![mid, cid, sender.id.to_string(), sender.kind.as_str(), content, ts(now)],
            )?;
            tx.execute(
                "UPDATE conversations SET last_activity_at = ?2 WHERE id = ?1",
                params![cid, ts(now)],
            )?;

            let message = tx.query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
                [&mid],
                map_message,
            )?;
            let conversation = query_conversation(&tx, &cid)?
                .ok_or_else(|| anyhow!("Conversation vanished: {}", cid))?;
            tx.commit()?;

            Ok(AppendOutcome::Appended {
                message,
                conversation,
            })
        })
    }

    /// Messages of a conversation in append order.
    pub fn messages_for(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY seq ASC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map([conversation_id.to_string()], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flags every unread message not sent by `reader_id` as read.
    pub fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> Result<MarkReadOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let cid = conversation_id.to_string();

            let Some(conversation) = query_conversation(&tx, &cid)? else {
                return Ok(MarkReadOutcome::MissingConversation);
            };
            if !conversation.has_participant(reader_id) {
                return Ok(MarkReadOutcome::NotParticipant);
            }

            let updated = tx.execute(
                "UPDATE messages SET read = 1
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND read = 0",
                params![cid, reader_id.to_string()],
            )?;
            tx.commit()?;

            Ok(MarkReadOutcome::Marked {
                conversation,
                updated,
            })
        })
    }

    /// Unread messages addressed to the actor across all their conversations.
    pub fn unread_count_for(&self, actor_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages m
                 JOIN conversation_participants p ON p.conversation_id = m.conversation_id
                 WHERE p.actor_id = ?1 AND m.read = 0 AND m.sender_id != ?1",
                [actor_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
    let head = conn
        .query_row(
            "SELECT id, created_at, last_activity_at FROM conversations WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    text_col::<Uuid>(row, 0)?,
                    text_col::<DateTime<Utc>>(row, 1)?,
                    text_col::<DateTime<Utc>>(row, 2)?,
                ))
            },
        )
        .optional()?;

    let Some((id, created_at, last_activity_at)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT actor_id, actor_kind FROM conversation_participants
         WHERE conversation_id = ?1 ORDER BY position",
    )?;
    let participants = stmt
        .query_map([id.to_string()], |row| {
            Ok(Actor::new(text_col(row, 0)?, text_col(row, 1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(Conversation {
        id,
        participants,
        created_at,
        last_activity_at,
    }))
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: text_col(row, 0)?,
        conversation_id: text_col(row, 1)?,
        sender: Actor::new(text_col(row, 2)?, text_col(row, 3)?),
        content: row.get(4)?,
        created_at: text_col(row, 5)?,
        read: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawlink_types::models::ActorKind;

    fn pair() -> (Actor, Actor) {
        (
            Actor::new(Uuid::new_v4(), ActorKind::Owner),
            Actor::new(Uuid::new_v4(), ActorKind::Clinic),
        )
    }

    #[test]
    fn test_participant_key_ignores_order() {
        let (a, b) = pair();
        assert_eq!(participant_key(&[a, b]), participant_key(&[b, a]));
    }

    #[test]
    fn test_find_or_create_reuses_existing() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = pair();

        let first = db.find_or_create_conversation(Uuid::new_v4(), &[a, b], Utc::now()).unwrap();
        let second = db.find_or_create_conversation(Uuid::new_v4(), &[b, a], Utc::now()).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.conversation, second.conversation);
        assert_eq!(first.conversation.participants, vec![a, b]);
    }

    #[test]
    fn test_append_and_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = pair();
        let stranger = Actor::new(Uuid::new_v4(), ActorKind::Shop);
        let conv = db
            .find_or_create_conversation(Uuid::new_v4(), &[a, b], Utc::now())
            .unwrap()
            .conversation;

        for text in ["one", "two", "three"] {
            let outcome = db.append_message(Uuid::new_v4(), conv.id, a, text, Utc::now()).unwrap();
            assert!(matches!(outcome, AppendOutcome::Appended { .. }));
        }
        assert!(matches!(
            db.append_message(Uuid::new_v4(), conv.id, stranger, "hi", Utc::now()).unwrap(),
            AppendOutcome::NotParticipant
        ));
        assert!(matches!(
            db.append_message(Uuid::new_v4(), Uuid::new_v4(), a, "hi", Utc::now()).unwrap(),
            AppendOutcome::MissingConversation
        ));

        let texts: Vec<String> = db.messages_for(conv.id).unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(db.unread_count_for(b.id).unwrap(), 3);
        assert_eq!(db.unread_count_for(a.id).unwrap(), 0);

        match db.mark_conversation_read(conv.id, b.id).unwrap() {
            MarkReadOutcome::Marked { updated, .. } => assert_eq!(updated, 3),
            _ => panic!("expected Marked"),
        }
        assert_eq!(db.unread_count_for(b.id).unwrap(), 0);
    }

    #[test]
    fn test_conversations_for_orders_by_activity() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = pair();
        let c = Actor::new(Uuid::new_v4(), ActorKind::Doctor);
        let t0 = Utc::now();

        let older = db.find_or_create_conversation(Uuid::new_v4(), &[a, b], t0).unwrap().conversation;
        let newer = db.find_or_create_conversation(Uuid::new_v4(), &[a, c], t0).unwrap().conversation;
        db.append_message(Uuid::new_v4(), newer.id, c, "newer", t0 + chrono::Duration::seconds(1))
            .unwrap();
        db.append_message(Uuid::new_v4(), older.id, b, "latest", t0 + chrono::Duration::seconds(2))
            .unwrap();

        let listed = db.conversations_for(a.id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].conversation.id, older.id);
        assert_eq!(listed[0].unread, 1);
        assert_eq!(listed[0].last_message.as_ref().unwrap().content, "latest");
        assert_eq!(listed[1].conversation.id, newer.id);
    }
}
