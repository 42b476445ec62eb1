use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{RatingSummary, Review};
use crate::store::ConversationStore;

#[derive(Serialize)]
pub struct ReviewerInfo {
    pub id: String,
    pub nickname: String,
    pub profile_image: Option<String>,
}

#[derive(Serialize)]
pub struct ReviewWithReviewer {
    #[serde(flatten)]
    pub review: Review,
    pub reviewer: Option<ReviewerInfo>,
}

/// Reviews received by a user, newest first, with reviewer display data
/// attached. The reviewer may have been deleted since; the review still
/// stands on its own.
pub async fn reviews_received(
    store: &dyn ConversationStore,
    reviewee_id: &str,
) -> Result<Vec<ReviewWithReviewer>, ApiError> {
    let mut out = Vec::new();
    for review in store.reviews_for_user(reviewee_id).await? {
        let reviewer = store
            .user_by_id(&review.reviewer_id)
            .await?
            .map(|u| ReviewerInfo {
                id: u.id.clone(),
                nickname: u.nickname.clone(),
                profile_image: u.profile_image.clone(),
            });
        out.push(ReviewWithReviewer { review, reviewer });
    }
    Ok(out)
}

pub async fn rating_summary(
    store: &dyn ConversationStore,
    reviewee_id: &str,
) -> Result<RatingSummary, ApiError> {
    let reviews = store.reviews_for_user(reviewee_id).await?;
    if reviews.is_empty() {
        return Ok(RatingSummary {
            average_rating: 0.0,
            review_count: 0,
        });
    }
    let sum: i32 = reviews.iter().map(|r| r.rating).sum();
    let average = sum as f64 / reviews.len() as f64;
    Ok(RatingSummary {
        average_rating: (average * 10.0).round() / 10.0,
        review_count: reviews.len(),
    })
}

// ---- handlers ----

pub async fn list_reviews(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let reviews = reviews_received(data.store.as_ref(), &user_id).await?;
    Ok(HttpResponse::Ok().json(reviews))
}

pub async fn review_summary(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let summary = rating_summary(data.store.as_ref(), &user_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::Utc;
    use uuid::Uuid;

    async fn seed_review(store: &MemoryStore, reviewee: &str, rating: i32) {
        store
            .insert_review(&Review {
                id: Uuid::new_v4().to_string(),
                reviewer_id: "reviewer".to_string(),
                reviewee_id: reviewee.to_string(),
                conversation_id: Uuid::new_v4().to_string(),
                rating,
                comment: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn summary_averages_to_one_decimal() {
        let store = MemoryStore::new();
        for rating in [5, 4, 4] {
            seed_review(&store, "ben", rating).await;
        }
        let summary = rating_summary(&store, "ben").await.unwrap();
        assert_eq!(summary.review_count, 3);
        assert_eq!(summary.average_rating, 4.3);
    }

    #[tokio::test]
    async fn summary_of_nobody_is_zero() {
        let store = MemoryStore::new();
        let summary = rating_summary(&store, "ghost").await.unwrap();
        assert_eq!(summary.review_count, 0);
        assert_eq!(summary.average_rating, 0.0);
    }

    #[tokio::test]
    async fn missing_reviewer_does_not_drop_the_review() {
        let store = MemoryStore::new();
        seed_review(&store, "ben", 5).await;
        let reviews = reviews_received(&store, "ben").await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert!(reviews[0].reviewer.is_none());
    }
}
