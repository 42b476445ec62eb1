use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the marketplace a user is on. Bikers request shoots,
/// photographers provide them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Biker,
    Photographer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub password: String,
    pub nickname: String,
    pub user_type: UserRole,
    pub prefecture: Option<String>,
    pub bike_maker: Option<String>,
    pub bike_model: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    pub website_url: Option<String>,
    pub minimum_rate: Option<i64>,
    pub rate_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as exposed over the API: everything except the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub nickname: String,
    pub user_type: UserRole,
    pub prefecture: Option<String>,
    pub bike_maker: Option<String>,
    pub bike_model: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub genres: Vec<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    pub website_url: Option<String>,
    pub minimum_rate: Option<i64>,
    pub rate_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            nickname: self.nickname.clone(),
            user_type: self.user_type,
            prefecture: self.prefecture.clone(),
            bike_maker: self.bike_maker.clone(),
            bike_model: self.bike_model.clone(),
            bio: self.bio.clone(),
            profile_image: self.profile_image.clone(),
            genres: self.genres.clone(),
            instagram_url: self.instagram_url.clone(),
            twitter_url: self.twitter_url.clone(),
            website_url: self.website_url.clone(),
            minimum_rate: self.minimum_rate,
            rate_details: self.rate_details.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Display name used on conversation records.
    pub fn display_name(&self) -> String {
        if self.nickname.is_empty() {
            self.email.clone()
        } else {
            self.nickname.clone()
        }
    }
}

/// A thread between exactly one biker and one photographer. Each
/// engagement gets a fresh id; `pair_key` is derived from the unordered
/// participant pair and is unique across live records, so at most one
/// conversation per pair exists at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: String,
    pub pair_key: String,
    pub biker_id: String,
    pub photographer_id: String,
    pub biker_name: String,
    pub photographer_name: String,
    /// Cached preview of the newest message; empty until the first send,
    /// which also keeps the conversation out of every listing.
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_by: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.biker_id == user_id || self.photographer_id == user_id
    }

    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        if self.biker_id == user_id {
            Some(&self.photographer_id)
        } else if self.photographer_id == user_id {
            Some(&self.biker_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    /// Media object key, if the message carries an image.
    pub attachment: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
    /// Kept after the conversation itself is deleted.
    pub conversation_id: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(rename = "_id")]
    pub id: String,
    pub photographer_id: String,
    pub image_key: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub review_count: usize,
}
