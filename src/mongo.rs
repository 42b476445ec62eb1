use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Serialize;

use crate::error::ApiError;
use crate::models::{Conversation, Message, Portfolio, Review, User};
use crate::store::{ConversationStore, PhotographerFilter, ProfileUpdate};

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        MongoDB { client, db }
    }
}

fn to_bson<T: Serialize>(value: &T) -> Result<Bson, ApiError> {
    mongodb::bson::to_bson(value).map_err(|e| ApiError::Database(e.into()))
}

pub struct MongoStore {
    db: MongoDB,
}

impl MongoStore {
    pub fn new(db: MongoDB) -> Self {
        MongoStore { db }
    }

    /// One live conversation per participant pair; enforced here so two
    /// racing `get_or_create` calls collapse into a duplicate-key error.
    pub async fn ensure_indexes(&self) -> Result<(), ApiError> {
        let pair_unique = IndexModel::builder()
            .keys(doc! { "pair_key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.conversations().create_index(pair_unique).await?;
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.db.collection::<User>("users")
    }

    fn conversations(&self) -> Collection<Conversation> {
        self.db.db.collection::<Conversation>("conversations")
    }

    fn messages(&self) -> Collection<Message> {
        self.db.db.collection::<Message>("messages")
    }

    fn reviews(&self) -> Collection<Review> {
        self.db.db.collection::<Review>("reviews")
    }

    fn portfolios(&self) -> Collection<Portfolio> {
        self.db.db.collection::<Portfolio>("portfolios")
    }
}

async fn collect<T>(mut cursor: mongodb::Cursor<T>) -> Result<Vec<T>, ApiError>
where
    T: serde::de::DeserializeOwned + Unpin + Send + Sync,
{
    let mut out = Vec::new();
    while let Some(item) = cursor.next().await {
        out.push(item?);
    }
    Ok(out)
}

#[async_trait]
impl ConversationStore for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<(), ApiError> {
        self.users().insert_one(user).await?;
        Ok(())
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, ApiError> {
        Ok(self.users().find_one(doc! { "_id": id }).await?)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<User, ApiError> {
        let mut set = doc! { "updated_at": to_bson(&Utc::now())? };
        if let Some(v) = &update.nickname {
            set.insert("nickname", v.as_str());
        }
        if let Some(v) = &update.prefecture {
            set.insert("prefecture", v.as_str());
        }
        if let Some(v) = &update.bike_maker {
            set.insert("bike_maker", v.as_str());
        }
        if let Some(v) = &update.bike_model {
            set.insert("bike_model", v.as_str());
        }
        if let Some(v) = &update.bio {
            set.insert("bio", v.as_str());
        }
        if let Some(v) = &update.profile_image {
            set.insert("profile_image", v.as_str());
        }
        if let Some(v) = &update.genres {
            set.insert("genres", v.clone());
        }
        if let Some(v) = &update.instagram_url {
            set.insert("instagram_url", v.as_str());
        }
        if let Some(v) = &update.twitter_url {
            set.insert("twitter_url", v.as_str());
        }
        if let Some(v) = &update.website_url {
            set.insert("website_url", v.as_str());
        }
        if let Some(v) = update.minimum_rate {
            set.insert("minimum_rate", v);
        }
        if let Some(v) = &update.rate_details {
            set.insert("rate_details", v.as_str());
        }

        self.users()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(ApiError::NotFound("user"))
    }

    async fn list_photographers(
        &self,
        filter: &PhotographerFilter,
    ) -> Result<Vec<User>, ApiError> {
        let mut query: Document = doc! { "user_type": "photographer" };
        if let Some(prefecture) = &filter.prefecture {
            query.insert("prefecture", prefecture.as_str());
        }
        if let Some(genre) = &filter.genre {
            query.insert("genres", genre.as_str());
        }
        let cursor = self.users().find(query).await?;
        collect(cursor).await
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), ApiError> {
        match self.conversations().insert_one(conversation).await {
            Ok(_) => Ok(()),
            Err(err) => {
                // Duplicate pair key: someone created the same thread first.
                if let ErrorKind::Write(WriteFailure::WriteError(ref write_err)) = *err.kind {
                    if write_err.code == 11000 {
                        return Err(ApiError::Conflict(
                            "conversation already exists".to_string(),
                        ));
                    }
                }
                Err(err.into())
            }
        }
    }

    async fn conversation_by_id(&self, id: &str) -> Result<Option<Conversation>, ApiError> {
        Ok(self.conversations().find_one(doc! { "_id": id }).await?)
    }

    async fn conversation_by_pair(
        &self,
        pair_key: &str,
    ) -> Result<Option<Conversation>, ApiError> {
        Ok(self
            .conversations()
            .find_one(doc! { "pair_key": pair_key })
            .await?)
    }

    async fn conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, ApiError> {
        let filter = doc! {
            "$or": [ { "biker_id": user_id }, { "photographer_id": user_id } ]
        };
        let cursor = self
            .conversations()
            .find(filter)
            .sort(doc! { "last_message_at": -1 })
            .await?;
        collect(cursor).await
    }

    async fn touch_last_message(
        &self,
        conversation_id: &str,
        preview: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        self.conversations()
            .update_one(
                doc! { "_id": conversation_id },
                doc! { "$set": { "last_message": preview, "last_message_at": to_bson(&at)? } },
            )
            .await?;
        Ok(())
    }

    async fn add_completed_by(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, ApiError> {
        self.conversations()
            .find_one_and_update(
                doc! { "_id": conversation_id },
                doc! { "$addToSet": { "completed_by": user_id } },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(ApiError::NotFound("conversation"))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.messages()
            .delete_many(doc! { "conversation_id": conversation_id })
            .await?;
        self.conversations()
            .delete_one(doc! { "_id": conversation_id })
            .await?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), ApiError> {
        self.messages().insert_one(message).await?;
        Ok(())
    }

    async fn messages_for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let cursor = self
            .messages()
            .find(doc! { "conversation_id": conversation_id })
            .sort(doc! { "created_at": 1 })
            .await?;
        collect(cursor).await
    }

    async fn unread_count(&self, conversation_id: &str, user_id: &str) -> Result<u64, ApiError> {
        let filter = doc! {
            "conversation_id": conversation_id,
            "sender_id": { "$ne": user_id },
            "is_read": false,
        };
        Ok(self.messages().count_documents(filter).await?)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<u64, ApiError> {
        let filter = doc! {
            "conversation_id": conversation_id,
            "sender_id": { "$ne": reader_id },
            "is_read": false,
        };
        let result = self
            .messages()
            .update_many(filter, doc! { "$set": { "is_read": true } })
            .await?;
        Ok(result.modified_count)
    }

    async fn insert_review(&self, review: &Review) -> Result<(), ApiError> {
        self.reviews().insert_one(review).await?;
        Ok(())
    }

    async fn review_for(
        &self,
        conversation_id: &str,
        reviewer_id: &str,
    ) -> Result<Option<Review>, ApiError> {
        let filter = doc! {
            "conversation_id": conversation_id,
            "reviewer_id": reviewer_id,
        };
        Ok(self.reviews().find_one(filter).await?)
    }

    async fn reviews_for_user(&self, reviewee_id: &str) -> Result<Vec<Review>, ApiError> {
        let cursor = self
            .reviews()
            .find(doc! { "reviewee_id": reviewee_id })
            .sort(doc! { "created_at": -1 })
            .await?;
        collect(cursor).await
    }

    async fn insert_portfolio(&self, item: &Portfolio) -> Result<(), ApiError> {
        self.portfolios().insert_one(item).await?;
        Ok(())
    }

    async fn portfolio_by_id(&self, id: &str) -> Result<Option<Portfolio>, ApiError> {
        Ok(self.portfolios().find_one(doc! { "_id": id }).await?)
    }

    async fn portfolios_for_user(
        &self,
        photographer_id: &str,
    ) -> Result<Vec<Portfolio>, ApiError> {
        let cursor = self
            .portfolios()
            .find(doc! { "photographer_id": photographer_id })
            .sort(doc! { "created_at": -1 })
            .await?;
        collect(cursor).await
    }

    async fn delete_portfolio(&self, id: &str) -> Result<(), ApiError> {
        self.portfolios().delete_one(doc! { "_id": id }).await?;
        Ok(())
    }
}
