use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ApiError;
use crate::models::UserProfile;
use crate::reviews;
use crate::store::{PhotographerFilter, ProfileUpdate};

pub async fn get_user(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .store
        .user_by_id(&user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(HttpResponse::Ok().json(user.profile()))
}

pub async fn update_user(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
    update: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, ApiError> {
    let caller = current_user(&req)?;
    if caller != *user_id {
        return Err(ApiError::Forbidden(
            "cannot edit another user's profile".to_string(),
        ));
    }
    if let Some(nickname) = &update.nickname {
        if nickname.trim().is_empty() {
            return Err(ApiError::Validation("nickname cannot be empty".to_string()));
        }
    }
    let user = data.store.update_profile(&user_id, &update).await?;
    Ok(HttpResponse::Ok().json(user.profile()))
}

#[derive(Deserialize)]
pub struct FindUserQuery {
    pub email: String,
}

pub async fn find_user_by_email(
    data: web::Data<AppState>,
    query: web::Query<FindUserQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .store
        .user_by_email(&query.email)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(HttpResponse::Ok().json(user.profile()))
}

/// Directory card: profile plus aggregated review data, the way the
/// search page renders photographers.
#[derive(Serialize)]
pub struct PhotographerCard {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub review_count: usize,
    pub average_rating: f64,
}

pub async fn list_photographers(
    data: web::Data<AppState>,
    filter: web::Query<PhotographerFilter>,
) -> Result<HttpResponse, ApiError> {
    let photographers = data.store.list_photographers(&filter).await?;
    let mut cards = Vec::with_capacity(photographers.len());
    for photographer in photographers {
        let summary = reviews::rating_summary(data.store.as_ref(), &photographer.id).await?;
        cards.push(PhotographerCard {
            profile: photographer.profile(),
            review_count: summary.review_count,
            average_rating: summary.average_rating,
        });
    }
    Ok(HttpResponse::Ok().json(cards))
}

#[cfg(test)]
mod tests {
    use crate::memory::MemoryStore;
    use crate::models::{User, UserRole};
    use crate::store::{ConversationStore, PhotographerFilter, ProfileUpdate};
    use chrono::Utc;

    fn photographer(id: &str, prefecture: &str, genres: &[&str]) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            password: "hash".to_string(),
            nickname: id.to_string(),
            user_type: UserRole::Photographer,
            prefecture: Some(prefecture.to_string()),
            bike_maker: None,
            bike_model: None,
            bio: None,
            profile_image: None,
            genres: genres.iter().map(|g| g.to_string()).collect(),
            instagram_url: None,
            twitter_url: None,
            website_url: None,
            minimum_rate: None,
            rate_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn directory_filters_by_prefecture_and_genre() {
        let store = MemoryStore::new();
        store
            .insert_user(&photographer("ben", "Tokyo", &["touring"]))
            .await
            .unwrap();
        store
            .insert_user(&photographer("kai", "Osaka", &["circuit"]))
            .await
            .unwrap();

        let filter = PhotographerFilter {
            prefecture: Some("Tokyo".to_string()),
            genre: None,
        };
        let found = store.list_photographers(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "ben");

        let filter = PhotographerFilter {
            prefecture: None,
            genre: Some("circuit".to_string()),
        };
        let found = store.list_photographers(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "kai");
    }

    #[tokio::test]
    async fn profile_update_only_touches_provided_fields() {
        let store = MemoryStore::new();
        store
            .insert_user(&photographer("ben", "Tokyo", &["touring"]))
            .await
            .unwrap();

        let update = ProfileUpdate {
            bio: Some("night shoots a specialty".to_string()),
            ..Default::default()
        };
        let updated = store.update_profile("ben", &update).await.unwrap();
        assert_eq!(updated.bio.as_deref(), Some("night shoots a specialty"));
        assert_eq!(updated.prefecture.as_deref(), Some("Tokyo"));
        assert_eq!(updated.nickname, "ben");
    }
}
