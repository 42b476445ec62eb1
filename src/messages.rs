use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ApiError;
use crate::hub::{Publish, PushEvent};
use crate::models::{Conversation, Message};
use crate::store::ConversationStore;

/// Preview shown in conversation listings for attachment-only messages.
const IMAGE_PREVIEW: &str = "[image]";

async fn participant_conversation(
    store: &dyn ConversationStore,
    conversation_id: &str,
    user_id: &str,
) -> Result<Conversation, ApiError> {
    let conversation = store
        .conversation_by_id(conversation_id)
        .await?
        .ok_or(ApiError::NotFound("conversation"))?;
    if !conversation.is_participant(user_id) {
        return Err(ApiError::Forbidden("not a participant".to_string()));
    }
    Ok(conversation)
}

/// Appends to the conversation's log and refreshes the cached
/// last-message preview, so summaries never rescan the log.
pub async fn send_message(
    store: &dyn ConversationStore,
    conversation_id: &str,
    sender_id: &str,
    content: Option<String>,
    attachment: Option<String>,
) -> Result<Message, ApiError> {
    let content = content.map(|c| c.trim().to_string()).unwrap_or_default();
    if content.is_empty() && attachment.is_none() {
        return Err(ApiError::Validation(
            "a message needs text or an attachment".to_string(),
        ));
    }
    participant_conversation(store, conversation_id, sender_id).await?;

    let message = Message {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        content,
        attachment,
        is_read: false,
        created_at: Utc::now(),
    };
    store.insert_message(&message).await?;

    let preview = if message.content.is_empty() {
        IMAGE_PREVIEW
    } else {
        &message.content
    };
    store
        .touch_last_message(conversation_id, preview, message.created_at)
        .await?;
    Ok(message)
}

/// The viewer's side of "open a conversation": flip every unread peer
/// message in one batch, then recompute the total in the same unit so
/// the response can never carry a stale double-count.
pub struct ReadReceipt {
    pub marked_read: u64,
    pub total_unread: u64,
}

pub async fn open_conversation(
    store: &dyn ConversationStore,
    conversation_id: &str,
    reader_id: &str,
) -> Result<ReadReceipt, ApiError> {
    participant_conversation(store, conversation_id, reader_id).await?;
    let marked_read = store
        .mark_conversation_read(conversation_id, reader_id)
        .await?;
    let total_unread = total_unread(store, reader_id).await?;
    Ok(ReadReceipt {
        marked_read,
        total_unread,
    })
}

/// Always derived from message state, never cached.
pub async fn total_unread(
    store: &dyn ConversationStore,
    user_id: &str,
) -> Result<u64, ApiError> {
    let mut total = 0;
    for conversation in store.conversations_for_user(user_id).await? {
        total += store.unread_count(&conversation.id, user_id).await?;
    }
    Ok(total)
}

// ---- handlers ----

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub attachment: Option<String>,
}

pub async fn create_message(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
    info: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let message = send_message(
        data.store.as_ref(),
        &conversation_id,
        &user_id,
        info.content.clone(),
        info.attachment.clone(),
    )
    .await?;

    if let Some(conversation) = data.store.conversation_by_id(&conversation_id).await? {
        if let Some(peer) = conversation.peer_of(&user_id) {
            data.hub.do_send(Publish {
                user_ids: vec![peer.to_string()],
                event: PushEvent::Message {
                    conversation_id: conversation.id.clone(),
                    message: message.clone(),
                },
            });
        }
    }
    Ok(HttpResponse::Ok().json(message))
}

pub async fn get_messages(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    participant_conversation(data.store.as_ref(), &conversation_id, &user_id).await?;
    let messages = data
        .store
        .messages_for_conversation(&conversation_id)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[derive(Serialize)]
struct ReadResponse {
    conversation_id: String,
    marked_read: u64,
    total_unread: u64,
}

pub async fn mark_read(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let receipt = open_conversation(data.store.as_ref(), &conversation_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(ReadResponse {
        conversation_id: conversation_id.into_inner(),
        marked_read: receipt.marked_read,
        total_unread: receipt.total_unread,
    }))
}

pub async fn unread_total(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let total = total_unread(data.store.as_ref(), &user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "total_unread": total })))
}
