use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::warn;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ApiError;
use crate::models::{Portfolio, UserRole};

#[derive(Deserialize)]
pub struct CreatePortfolioRequest {
    pub image_key: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

pub async fn create_portfolio(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<CreatePortfolioRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let user = data
        .store
        .user_by_id(&user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if user.user_type != UserRole::Photographer {
        return Err(ApiError::Forbidden(
            "only photographers have portfolios".to_string(),
        ));
    }
    if info.image_key.trim().is_empty() {
        return Err(ApiError::Validation("image_key is required".to_string()));
    }

    let item = Portfolio {
        id: Uuid::new_v4().to_string(),
        photographer_id: user_id,
        image_key: info.image_key.clone(),
        title: info.title.clone(),
        description: info.description.clone(),
        created_at: Utc::now(),
    };
    data.store.insert_portfolio(&item).await?;
    Ok(HttpResponse::Ok().json(item))
}

pub async fn list_portfolios(
    data: web::Data<AppState>,
    photographer_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let items = data.store.portfolios_for_user(&photographer_id).await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn delete_portfolio(
    req: HttpRequest,
    data: web::Data<AppState>,
    portfolio_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = current_user(&req)?;
    let item = data
        .store
        .portfolio_by_id(&portfolio_id)
        .await?
        .ok_or(ApiError::NotFound("portfolio"))?;
    if item.photographer_id != user_id {
        return Err(ApiError::Forbidden(
            "cannot delete another photographer's work".to_string(),
        ));
    }
    // Best effort on the object; the record goes regardless.
    if let Err(e) = data.media.delete(&item.image_key).await {
        warn!("Failed to delete media object {}: {}", item.image_key, e);
    }
    data.store.delete_portfolio(&portfolio_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": portfolio_id.into_inner() })))
}
