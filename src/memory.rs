use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::{Conversation, Message, Portfolio, Review, User};
use crate::store::{ConversationStore, PhotographerFilter, ProfileUpdate};

/// In-memory stand-in for MongoDB behind the same trait; used by the
/// test suite and by `STORE=memory` dev runs. Replaces the original
/// system's browser-storage mock layer.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    conversations: HashMap<String, Conversation>,
    messages: Vec<Message>,
    reviews: Vec<Review>,
    portfolios: Vec<Portfolio>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), ApiError> {
        let mut inner = self.locked();
        if inner.users.contains_key(&user.id) {
            return Err(ApiError::Conflict("user already exists".to_string()));
        }
        inner.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, ApiError> {
        Ok(self.locked().users.get(id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        Ok(self
            .locked()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<User, ApiError> {
        let mut inner = self.locked();
        let user = inner.users.get_mut(id).ok_or(ApiError::NotFound("user"))?;
        if let Some(v) = &update.nickname {
            user.nickname = v.clone();
        }
        if let Some(v) = &update.prefecture {
            user.prefecture = Some(v.clone());
        }
        if let Some(v) = &update.bike_maker {
            user.bike_maker = Some(v.clone());
        }
        if let Some(v) = &update.bike_model {
            user.bike_model = Some(v.clone());
        }
        if let Some(v) = &update.bio {
            user.bio = Some(v.clone());
        }
        if let Some(v) = &update.profile_image {
            user.profile_image = Some(v.clone());
        }
        if let Some(v) = &update.genres {
            user.genres = v.clone();
        }
        if let Some(v) = &update.instagram_url {
            user.instagram_url = Some(v.clone());
        }
        if let Some(v) = &update.twitter_url {
            user.twitter_url = Some(v.clone());
        }
        if let Some(v) = &update.website_url {
            user.website_url = Some(v.clone());
        }
        if let Some(v) = update.minimum_rate {
            user.minimum_rate = Some(v);
        }
        if let Some(v) = &update.rate_details {
            user.rate_details = Some(v.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn list_photographers(
        &self,
        filter: &PhotographerFilter,
    ) -> Result<Vec<User>, ApiError> {
        let inner = self.locked();
        Ok(inner
            .users
            .values()
            .filter(|u| u.user_type == crate::models::UserRole::Photographer)
            .filter(|u| match &filter.prefecture {
                Some(p) => u.prefecture.as_deref() == Some(p.as_str()),
                None => true,
            })
            .filter(|u| match &filter.genre {
                Some(g) => u.genres.iter().any(|have| have == g),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), ApiError> {
        let mut inner = self.locked();
        let duplicate = inner.conversations.contains_key(&conversation.id)
            || inner
                .conversations
                .values()
                .any(|c| c.pair_key == conversation.pair_key);
        if duplicate {
            return Err(ApiError::Conflict(
                "conversation already exists".to_string(),
            ));
        }
        inner
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn conversation_by_id(&self, id: &str) -> Result<Option<Conversation>, ApiError> {
        Ok(self.locked().conversations.get(id).cloned())
    }

    async fn conversation_by_pair(
        &self,
        pair_key: &str,
    ) -> Result<Option<Conversation>, ApiError> {
        Ok(self
            .locked()
            .conversations
            .values()
            .find(|c| c.pair_key == pair_key)
            .cloned())
    }

    async fn conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, ApiError> {
        let inner = self.locked();
        let mut out: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(out)
    }

    async fn touch_last_message(
        &self,
        conversation_id: &str,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let mut inner = self.locked();
        if let Some(conversation) = inner.conversations.get_mut(conversation_id) {
            conversation.last_message = preview.to_string();
            conversation.last_message_at = at;
        }
        Ok(())
    }

    async fn add_completed_by(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError> {
        let mut inner = self.locked();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or(ApiError::NotFound("conversation"))?;
        if !conversation.completed_by.iter().any(|id| id == user_id) {
            conversation.completed_by.push(user_id.to_string());
        }
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let mut inner = self.locked();
        inner.conversations.remove(conversation_id);
        inner
            .messages
            .retain(|m| m.conversation_id != conversation_id);
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), ApiError> {
        self.locked().messages.push(message.clone());
        Ok(())
    }

    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let inner = self.locked();
        let mut out: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn unread_count(&self, conversation_id: &str, user_id: &str) -> Result<u64, ApiError> {
        let inner = self.locked();
        Ok(inner
            .messages
            .iter()
            .filter(|m| {
                m.conversation_id == conversation_id && m.sender_id != user_id && !m.is_read
            })
            .count() as u64)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<u64, ApiError> {
        let mut inner = self.locked();
        let mut flipped = 0;
        for message in inner.messages.iter_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != reader_id
                && !message.is_read
            {
                message.is_read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn insert_review(&self, review: &Review) -> Result<(), ApiError> {
        self.locked().reviews.push(review.clone());
        Ok(())
    }

    async fn review_for(
        &self,
        conversation_id: &str,
        reviewer_id: &str,
    ) -> Result<Option<Review>, ApiError> {
        Ok(self
            .locked()
            .reviews
            .iter()
            .find(|r| r.conversation_id == conversation_id && r.reviewer_id == reviewer_id)
            .cloned())
    }

    async fn reviews_for_user(&self, reviewee_id: &str) -> Result<Vec<Review>, ApiError> {
        let inner = self.locked();
        let mut out: Vec<Review> = inner
            .reviews
            .iter()
            .filter(|r| r.reviewee_id == reviewee_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn insert_portfolio(&self, item: &Portfolio) -> Result<(), ApiError> {
        self.locked().portfolios.push(item.clone());
        Ok(())
    }

    async fn portfolio_by_id(&self, id: &str) -> Result<Option<Portfolio>, ApiError> {
        Ok(self
            .locked()
            .portfolios
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn portfolios_for_user(
        &self,
        photographer_id: &str,
    ) -> Result<Vec<Portfolio>, ApiError> {
        let inner = self.locked();
        let mut out: Vec<Portfolio> = inner
            .portfolios
            .iter()
            .filter(|p| p.photographer_id == photographer_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_portfolio(&self, id: &str) -> Result<(), ApiError> {
        self.locked().portfolios.retain(|p| p.id != id);
        Ok(())
    }
}
