use serde::Serialize;

use crate::error::ApiError;
use crate::models::{Conversation, UserRole};

/// Lifecycle of a conversation, derived from `completed_by`. Cancelled
/// conversations are deleted outright and never observed as a state on a
/// live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Active,
    PendingCompletion,
    Completed,
}

pub fn state_of(conversation: &Conversation) -> ConversationState {
    match conversation.completed_by.len() {
        0 => ConversationState::Active,
        1 => ConversationState::PendingCompletion,
        _ => ConversationState::Completed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    /// First acknowledgment from this user; the peer has not acted yet.
    Recorded,
    /// Both participants have now acknowledged; the conversation is done.
    BothConfirmed,
    /// This user had already acknowledged; nothing changed.
    AlreadyRecorded,
}

/// Records `user_id`'s completion acknowledgment on the in-memory record.
/// Idempotent per user, and `completed_by` stays a subset of the two
/// participant ids.
pub fn acknowledge(
    conversation: &mut Conversation,
    user_id: &str,
) -> Result<Acknowledgment, ApiError> {
    if !conversation.is_participant(user_id) {
        return Err(ApiError::Forbidden(
            "only a participant can complete a conversation".to_string(),
        ));
    }
    if conversation.completed_by.iter().any(|id| id == user_id) {
        return Ok(Acknowledgment::AlreadyRecorded);
    }
    conversation.completed_by.push(user_id.to_string());
    if conversation.completed_by.len() >= 2 {
        Ok(Acknowledgment::BothConfirmed)
    } else {
        Ok(Acknowledgment::Recorded)
    }
}

/// Cancellation is reserved for the requesting side of the marketplace.
pub fn can_cancel(role: UserRole) -> bool {
    role == UserRole::Biker
}

/// A conversation is listed for a user only once it has a message and
/// that user has not declared it done.
pub fn visible_to(conversation: &Conversation, user_id: &str) -> bool {
    !conversation.last_message.is_empty()
        && !conversation.completed_by.iter().any(|id| id == user_id)
}
