use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::{Conversation, Message, Portfolio, Review, User};

/// Partial profile edit; only the provided fields are written.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    pub prefecture: Option<String>,
    pub bike_maker: Option<String>,
    pub bike_model: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub genres: Option<Vec<String>>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    pub website_url: Option<String>,
    pub minimum_rate: Option<i64>,
    pub rate_details: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PhotographerFilter {
    pub prefecture: Option<String>,
    pub genre: Option<String>,
}

/// The persistence surface of the whole service: users, conversations
/// with their messages, reviews, and portfolio items. Backed by MongoDB
/// in production and by an in-memory fake in tests and dev mode.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    // users
    async fn insert_user(&self, user: &User) -> Result<(), ApiError>;
    async fn user_by_id(&self, id: &str) -> Result<Option<User>, ApiError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, ApiError>;
    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<User, ApiError>;
    async fn list_photographers(
        &self,
        filter: &PhotographerFilter,
    ) -> Result<Vec<User>, ApiError>;

    // conversations, indexed by participant
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), ApiError>;
    async fn conversation_by_id(&self, id: &str) -> Result<Option<Conversation>, ApiError>;
    async fn conversation_by_pair(&self, pair_key: &str)
        -> Result<Option<Conversation>, ApiError>;
    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<Conversation>, ApiError>;
    async fn touch_last_message(
        &self,
        conversation_id: &str,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ApiError>;
    /// Set-insert; returns the updated record.
    async fn add_completed_by(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError>;
    /// Deletes the conversation together with all of its messages.
    /// Reviews referencing it are left alone.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;

    // messages, ordered by created_at within a conversation
    async fn insert_message(&self, message: &Message) -> Result<(), ApiError>;
    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ApiError>;
    async fn unread_count(&self, conversation_id: &str, user_id: &str) -> Result<u64, ApiError>;
    /// Batch-marks every unread message not sent by `reader_id`; returns
    /// how many were flipped. Idempotent by construction.
    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<u64, ApiError>;

    // reviews
    async fn insert_review(&self, review: &Review) -> Result<(), ApiError>;
    async fn review_for(
        &self,
        conversation_id: &str,
        reviewer_id: &str,
    ) -> Result<Option<Review>, ApiError>;
    async fn reviews_for_user(&self, reviewee_id: &str) -> Result<Vec<Review>, ApiError>;

    // portfolios
    async fn insert_portfolio(&self, item: &Portfolio) -> Result<(), ApiError>;
    async fn portfolio_by_id(&self, id: &str) -> Result<Option<Portfolio>, ApiError>;
    async fn portfolios_for_user(&self, photographer_id: &str)
        -> Result<Vec<Portfolio>, ApiError>;
    async fn delete_portfolio(&self, id: &str) -> Result<(), ApiError>;
}
