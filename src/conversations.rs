use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::completion::{self, Acknowledgment};
use crate::error::ApiError;
use crate::hub::{Publish, PushEvent};
use crate::models::{Conversation, Review, UserRole};
use crate::store::ConversationStore;

/// Unordered-pair key: uuid v5 over the sorted participant ids, so
/// `get_or_create(A, B)` and `get_or_create(B, A)` land on the same
/// record and a duplicate insert surfaces as a key conflict. The
/// conversation id itself is minted fresh per engagement, so a pair
/// that finishes one shoot and starts another gets a new record and a
/// new round of reviews.
pub fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", lo, hi).as_bytes()).to_string()
}

pub async fn get_or_create(
    store: &dyn ConversationStore,
    requester_id: &str,
    peer_id: &str,
) -> Result<Conversation, ApiError> {
    if requester_id == peer_id {
        return Err(ApiError::Validation(
            "cannot start a conversation with yourself".to_string(),
        ));
    }
    let pair = pair_key(requester_id, peer_id);
    if let Some(existing) = store.conversation_by_pair(&pair).await? {
        return Ok(existing);
    }

    let requester = store
        .user_by_id(requester_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    let peer = store
        .user_by_id(peer_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    // Role columns come from the profiles, not from who clicked first.
    let (biker, photographer) = match (requester.user_type, peer.user_type) {
        (UserRole::Biker, UserRole::Photographer) => (&requester, &peer),
        (UserRole::Photographer, UserRole::Biker) => (&peer, &requester),
        _ => {
            return Err(ApiError::Validation(
                "a conversation needs one rider and one photographer".to_string(),
            ))
        }
    };

    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4().to_string(),
        pair_key: pair,
        biker_id: biker.id.clone(),
        photographer_id: photographer.id.clone(),
        biker_name: biker.display_name(),
        photographer_name: photographer.display_name(),
        last_message: String::new(),
        last_message_at: now,
        completed_by: Vec::new(),
        created_at: now,
    };
    match store.insert_conversation(&conversation).await {
        Ok(()) => Ok(conversation),
        // Lost the race: someone inserted the same pair; reuse theirs.
        Err(ApiError::Conflict(_)) => store
            .conversation_by_pair(&conversation.pair_key)
            .await?
            .ok_or(ApiError::NotFound("conversation")),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread: u64,
}

/// The caller's conversation list: newest first, empty threads and
/// threads the caller already declared done are left out, and each entry
/// carries the caller's own unread count.
pub async fn visible_conversations(
    store: &dyn ConversationStore,
    user_id: &str,
) -> Result<Vec<ConversationSummary>, ApiError> {
    let mut out = Vec::new();
    for conversation in store.conversations_for_user(user_id).await? {
        if !completion::visible_to(&conversation, user_id) {
            continue;
        }
        let unread = store.unread_count(&conversation.id, user_id).await?;
        out.push(ConversationSummary {
            conversation,
            unread,
        });
    }
    Ok(out)
}

#[derive(Debug)]
pub struct CompletionOutcome {
    pub conversation: Conversation,
    pub acknowledgment: Acknowledgment,
}

/// Completion acknowledgment rides on review submission: the rating is
/// validated and the review written before the caller is added to
/// `completed_by`, so every completed side has left exactly one review.
/// Once both sides have confirmed, the conversation and its messages go
/// away; the reviews stay.
pub async fn complete(
    store: &dyn ConversationStore,
    conversation_id: &str,
    user_id: &str,
    rating: i32,
    comment: Option<String>,
) -> Result<CompletionOutcome, ApiError> {
    let conversation = store
        .conversation_by_id(conversation_id)
        .await?
        .ok_or(ApiError::NotFound("conversation"))?;

    // A repeated confirmation is a no-op before anything else is looked
    // at, so retries cannot fail on payload checks.
    let mut working = conversation.clone();
    if completion::acknowledge(&mut working, user_id)? == Acknowledgment::AlreadyRecorded {
        return Ok(CompletionOutcome {
            conversation,
            acknowledgment: Acknowledgment::AlreadyRecorded,
        });
    }
    if !(1..=5).contains(&rating) {
        return Err(ApiError::Validation(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    if conversation.last_message.is_empty() {
        return Err(ApiError::Validation(
            "nothing happened in this conversation yet".to_string(),
        ));
    }

    let reviewee = conversation
        .peer_of(user_id)
        .ok_or_else(|| ApiError::Forbidden("not a participant".to_string()))?
        .to_string();
    // Write-once per (conversation, reviewer).
    if store.review_for(conversation_id, user_id).await?.is_none() {
        let review = Review {
            id: Uuid::new_v4().to_string(),
            reviewer_id: user_id.to_string(),
            reviewee_id: reviewee,
            conversation_id: conversation_id.to_string(),
            rating,
            comment,
            created_at: Utc::now(),
        };
        store.insert_review(&review).await?;
    }

    let updated = store.add_completed_by(conversation_id, user_id).await?;
    if updated.completed_by.len() >= 2 {
        store.delete_conversation(conversation_id).await?;
        info!("Conversation {} completed by both sides, removed", conversation_id);
        Ok(CompletionOutcome {
            conversation: updated,
            acknowledgment: Acknowledgment::BothConfirmed,
        })
    } else {
        Ok(CompletionOutcome {
            conversation: updated,
            acknowledgment: Acknowledgment::Recorded,
        })
    }
}

/// Immediate teardown, biker side only. No review is required or
/// written.
pub async fn cancel(
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
    let user = store
        .user_by_id(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if !completion::can_cancel(user.user_type) {
        return Err(ApiError::Forbidden(
            "only the requesting rider can cancel".to_string(),
        ));
    }
    store.delete_conversation(conversation_id).await?;
    info!("Conversation {} cancelled by {}", conversation_id, user_id);
    Ok(conversation)
}

// ---- handlers ----

#[derive(Deserialize)]
pub struct StartConversationRequest {
    pub peer_id: String,
}

pub async fn start_conversation(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<StartConversationRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let conversation = get_or_create(data.store.as_ref(), &user_id, &info.peer_id).await?;
    Ok(HttpResponse::Ok().json(conversation))
}

pub async fn list_conversations(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let summaries = visible_conversations(data.store.as_ref(), &user_id).await?;
    Ok(HttpResponse::Ok().json(summaries))
}

pub async fn get_conversation(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let conversation = data
        .store
        .conversation_by_id(&conversation_id)
        .await?
        .ok_or(ApiError::NotFound("conversation"))?;
    if !conversation.is_participant(&user_id) {
        return Err(ApiError::Forbidden("not a participant".to_string()));
    }
    Ok(HttpResponse::Ok().json(conversation))
}

#[derive(Deserialize)]
pub struct CompleteRequest {
    pub rating: i32,
    pub comment: Option<String>,
}

pub async fn complete_conversation(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
    info: web::Json<CompleteRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let outcome = complete(
        data.store.as_ref(),
        &conversation_id,
        &user_id,
        info.rating,
        info.comment.clone(),
    )
    .await?;

    let conversation = &outcome.conversation;
    match outcome.acknowledgment {
        Acknowledgment::BothConfirmed => {
            data.hub.do_send(Publish {
                user_ids: vec![
                    conversation.biker_id.clone(),
                    conversation.photographer_id.clone(),
                ],
                event: PushEvent::ConversationRemoved {
                    conversation_id: conversation.id.clone(),
                },
            });
        }
        Acknowledgment::Recorded => {
            if let Some(peer) = conversation.peer_of(&user_id) {
                data.hub.do_send(Publish {
                    user_ids: vec![peer.to_string()],
                    event: PushEvent::ConversationUpdated {
                        conversation_id: conversation.id.clone(),
                    },
                });
            }
        }
        Acknowledgment::AlreadyRecorded => {}
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "conversation_id": conversation.id,
        "completed_by": conversation.completed_by,
        "state": completion::state_of(conversation),
        "removed": outcome.acknowledgment == Acknowledgment::BothConfirmed,
    })))
}

pub async fn cancel_conversation(
    req: HttpRequest,
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let conversation = cancel(data.store.as_ref(), &conversation_id, &user_id).await?;
    data.hub.do_send(Publish {
        user_ids: vec![
            conversation.biker_id.clone(),
            conversation.photographer_id.clone(),
        ],
        event: PushEvent::ConversationRemoved {
            conversation_id: conversation.id.clone(),
        },
    });
    Ok(HttpResponse::Ok().json(serde_json::json!({ "conversation_id": conversation.id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::messages;
    use crate::models::User;

    fn user(id: &str, role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            password: "hash".to_string(),
            nickname: id.to_string(),
            user_type: role,
            prefecture: None,
            bike_maker: None,
            bike_model: None,
            bio: None,
            profile_image: None,
            genres: Vec::new(),
            instagram_url: None,
            twitter_url: None,
            website_url: None,
            minimum_rate: None,
            rate_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store_with_pair() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_user(&user("alice", UserRole::Biker)).await.unwrap();
        store
            .insert_user(&user("ben", UserRole::Photographer))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn get_or_create_is_commutative() {
        let store = store_with_pair().await;
        let a = get_or_create(&store, "alice", "ben").await.unwrap();
        let b = get_or_create(&store, "ben", "alice").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.biker_id, "alice");
        assert_eq!(a.photographer_id, "ben");
    }

    #[tokio::test]
    async fn same_role_pair_is_rejected() {
        let store = store_with_pair().await;
        store
            .insert_user(&user("carol", UserRole::Biker))
            .await
            .unwrap();
        let err = get_or_create(&store, "alice", "carol").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_conversations_are_not_listed() {
        let store = store_with_pair().await;
        get_or_create(&store, "alice", "ben").await.unwrap();
        assert!(visible_conversations(&store, "alice").await.unwrap().is_empty());
        assert!(visible_conversations(&store, "ben").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_message_scenario() {
        let store = store_with_pair().await;
        let conv = get_or_create(&store, "alice", "ben").await.unwrap();
        messages::send_message(&store, &conv.id, "alice", Some("Hello".to_string()), None)
            .await
            .unwrap();

        let listed = visible_conversations(&store, "ben").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].conversation.last_message, "Hello");
        assert_eq!(listed[0].unread, 1);
        // The sender's own side shows no unread.
        let own = visible_conversations(&store, "alice").await.unwrap();
        assert_eq!(own[0].unread, 0);

        let receipt = messages::open_conversation(&store, &conv.id, "ben")
            .await
            .unwrap();
        assert_eq!(receipt.marked_read, 1);
        assert_eq!(receipt.total_unread, 0);
        let log = store.messages_for_conversation(&conv.id).await.unwrap();
        assert!(log.iter().all(|m| m.is_read));
    }

    #[tokio::test]
    async fn completion_by_both_sides_removes_thread_but_keeps_reviews() {
        let store = store_with_pair().await;
        let conv = get_or_create(&store, "alice", "ben").await.unwrap();
        messages::send_message(&store, &conv.id, "alice", Some("Hello".to_string()), None)
            .await
            .unwrap();

        let first = complete(&store, &conv.id, "ben", 5, None).await.unwrap();
        assert_eq!(first.acknowledgment, Acknowledgment::Recorded);
        assert_eq!(first.conversation.completed_by, vec!["ben".to_string()]);
        // Hidden from the side that completed, still visible to the
        // other.
        assert!(visible_conversations(&store, "ben").await.unwrap().is_empty());
        assert_eq!(visible_conversations(&store, "alice").await.unwrap().len(), 1);

        let second = complete(&store, &conv.id, "alice", 4, Some("great shoot".to_string()))
            .await
            .unwrap();
        assert_eq!(second.acknowledgment, Acknowledgment::BothConfirmed);
        assert!(store.conversation_by_id(&conv.id).await.unwrap().is_none());
        assert!(store
            .messages_for_conversation(&conv.id)
            .await
            .unwrap()
            .is_empty());
        // Both reviews outlive the conversation.
        assert_eq!(store.reviews_for_user("alice").await.unwrap().len(), 1);
        assert_eq!(store.reviews_for_user("ben").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completing_twice_is_a_no_op() {
        let store = store_with_pair().await;
        let conv = get_or_create(&store, "alice", "ben").await.unwrap();
        messages::send_message(&store, &conv.id, "alice", Some("Hi".to_string()), None)
            .await
            .unwrap();

        complete(&store, &conv.id, "ben", 5, None).await.unwrap();
        let again = complete(&store, &conv.id, "ben", 1, None).await.unwrap();
        assert_eq!(again.acknowledgment, Acknowledgment::AlreadyRecorded);

        let current = store.conversation_by_id(&conv.id).await.unwrap().unwrap();
        assert_eq!(current.completed_by, vec!["ben".to_string()]);
        // Still only the one review, with the original rating.
        let reviews = store.reviews_for_user("alice").await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, 5);
    }

    #[tokio::test]
    async fn repeat_engagement_gets_a_fresh_thread_and_fresh_reviews() {
        let store = store_with_pair().await;
        let first = get_or_create(&store, "alice", "ben").await.unwrap();
        messages::send_message(&store, &first.id, "alice", Some("Round one".to_string()), None)
            .await
            .unwrap();
        complete(&store, &first.id, "ben", 5, None).await.unwrap();
        complete(&store, &first.id, "alice", 4, None).await.unwrap();

        // The same pair books again: a new record, not the old one.
        let second = get_or_create(&store, "alice", "ben").await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.pair_key, first.pair_key);

        messages::send_message(&store, &second.id, "alice", Some("Round two".to_string()), None)
            .await
            .unwrap();
        complete(&store, &second.id, "ben", 3, None).await.unwrap();
        // Both engagements left their own review of alice.
        assert_eq!(store.reviews_for_user("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retry_with_bad_rating_is_still_a_no_op() {
        let store = store_with_pair().await;
        let conv = get_or_create(&store, "alice", "ben").await.unwrap();
        messages::send_message(&store, &conv.id, "alice", Some("Hi".to_string()), None)
            .await
            .unwrap();
        complete(&store, &conv.id, "ben", 5, None).await.unwrap();

        // A retried confirmation succeeds even with a junk payload.
        let again = complete(&store, &conv.id, "ben", 9, None).await.unwrap();
        assert_eq!(again.acknowledgment, Acknowledgment::AlreadyRecorded);
        let reviews = store.reviews_for_user("alice").await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, 5);
    }

    #[tokio::test]
    async fn empty_thread_cannot_be_completed() {
        let store = store_with_pair().await;
        let conv = get_or_create(&store, "alice", "ben").await.unwrap();
        let err = complete(&store, &conv.id, "ben", 5, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(store.reviews_for_user("alice").await.unwrap().is_empty());
        let current = store.conversation_by_id(&conv.id).await.unwrap().unwrap();
        assert!(current.completed_by.is_empty());
    }

    #[tokio::test]
    async fn rating_is_validated_before_anything_is_written() {
        let store = store_with_pair().await;
        let conv = get_or_create(&store, "alice", "ben").await.unwrap();
        let err = complete(&store, &conv.id, "ben", 6, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(store.reviews_for_user("alice").await.unwrap().is_empty());
        let current = store.conversation_by_id(&conv.id).await.unwrap().unwrap();
        assert!(current.completed_by.is_empty());
    }

    #[tokio::test]
    async fn cancel_is_biker_only_and_leaves_no_review() {
        let store = store_with_pair().await;
        let conv = get_or_create(&store, "alice", "ben").await.unwrap();
        messages::send_message(&store, &conv.id, "ben", Some("Hi".to_string()), None)
            .await
            .unwrap();

        let err = cancel(&store, &conv.id, "ben").await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert!(store.conversation_by_id(&conv.id).await.unwrap().is_some());

        cancel(&store, &conv.id, "alice").await.unwrap();
        assert!(store.conversation_by_id(&conv.id).await.unwrap().is_none());
        assert!(store
            .messages_for_conversation(&conv.id)
            .await
            .unwrap()
            .is_empty());
        assert!(store.reviews_for_user("alice").await.unwrap().is_empty());
        assert!(store.reviews_for_user("ben").await.unwrap().is_empty());
    }
}
