//! Query results that only exist at the storage boundary.
//! Domain models themselves live in pawlink-types.
use pawlink_types::models::{Alert, ChatMessage, Conversation};

/// Result of a find-or-create on a participant set.
pub struct ConversationLookup {
    pub conversation: Conversation,
    pub created: bool,
}

/// A conversation as listed for one participant.
pub struct ConversationOverview {
    pub conversation: Conversation,
    pub last_message: Option<ChatMessage>,
    pub unread: u64,
}

pub enum AppendOutcome {
    Appended {
        message: ChatMessage,
        conversation: Conversation,
    },
    MissingConversation,
    NotParticipant,
}

pub enum MarkReadOutcome {
    Marked {
        conversation: Conversation,
        updated: usize,
    },
    MissingConversation,
    NotParticipant,
}

pub struct AlertStatusChange {
    pub was_active: bool,
    pub alert: Alert,
}
