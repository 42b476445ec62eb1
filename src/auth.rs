use std::sync::OnceLock;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{User, UserRole};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn create_jwt(user_id: &str, secret: &str) -> Result<String, ApiError> {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims.sub)
}

/// User id stashed in request extensions by the authentication
/// middleware; absent means the request carried no valid token.
pub fn current_user(req: &HttpRequest) -> Result<String, ApiError> {
    req.extensions()
        .get::<String>()
        .cloned()
        .ok_or(ApiError::Unauthorized)
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"))
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
    pub user_type: UserRole,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn signup(
    data: web::Data<AppState>,
    info: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    if !email_regex().is_match(&info.email) {
        return Err(ApiError::Validation("invalid email address".to_string()));
    }
    if info.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    if info.nickname.trim().is_empty() {
        return Err(ApiError::Validation("nickname is required".to_string()));
    }
    if data.store.user_by_email(&info.email).await?.is_some() {
        return Err(ApiError::Conflict("email already registered".to_string()));
    }

    let hashed_password = hash(&info.password, DEFAULT_COST)
        .map_err(|e| ApiError::Validation(format!("could not hash password: {}", e)))?;
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: info.email.clone(),
        password: hashed_password,
        nickname: info.nickname.trim().to_string(),
        user_type: info.user_type,
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
    };
    data.store.insert_user(&user).await?;

    let token = create_jwt(&user.id, &data.config.jwt_secret)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user_id": user.id,
    })))
}

pub async fn login(
    data: web::Data<AppState>,
    info: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .store
        .user_by_email(&info.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !verify(&info.password, &user.password).unwrap_or(false) {
        return Err(ApiError::Unauthorized);
    }
    let token = create_jwt(&user.id, &data.config.jwt_secret)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user_id": user.id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_round_trip() {
        let token = create_jwt("user-1", "test-secret").unwrap();
        assert_eq!(verify_jwt(&token, "test-secret").unwrap(), "user-1");
        assert!(verify_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn email_shapes() {
        assert!(email_regex().is_match("rider@example.com"));
        assert!(!email_regex().is_match("rider@example"));
        assert!(!email_regex().is_match("not an email"));
    }
}
