use std::path::{Path, PathBuf};

use actix_web::{web, HttpRequest, HttpResponse};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ApiError;

const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;
// Base64 inflates the payload by a third, so the JSON body limit has to
// sit above MAX_MEDIA_BYTES for the decoded-size check to be reachable.
const MAX_UPLOAD_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().limit(MAX_UPLOAD_BODY_BYTES)
}

/// Object storage reduced to the three operations the app uses. Local
/// disk in this deployment; the interface is what matters.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, ApiError>;
    async fn delete(&self, key: &str) -> Result<(), ApiError>;
}

pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalMediaStore { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ApiError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(key), bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ApiError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::NotFound("media object"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ApiError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keys are uuid + extension, minted here; anything else is rejected so
/// a key can never escape the media root.
fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !key.contains("..")
}

fn extension_of(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

fn content_type_for(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Only image uploads are accepted; the extension doubles as the source
/// of the download content type when the file name carries none.
fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

// ---- handlers ----

#[derive(Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: String,
}

pub async fn upload(
    req: HttpRequest,
    data: web::Data<AppState>,
    info: web::Json<UploadRequest>,
) -> Result<HttpResponse, ApiError> {
    current_user(&req)?;
    let declared_ext = match &info.content_type {
        Some(ct) => Some(extension_for_content_type(ct).ok_or_else(|| {
            ApiError::Validation(format!("unsupported content type: {}", ct))
        })?),
        None => None,
    };
    let bytes = BASE64
        .decode(info.data.as_bytes())
        .map_err(|_| ApiError::Validation("media payload is not valid base64".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::Validation("media payload is empty".to_string()));
    }
    if bytes.len() > MAX_MEDIA_BYTES {
        return Err(ApiError::Validation("media payload too large".to_string()));
    }

    // Prefer the file name's extension, fall back to the declared type.
    let key = match extension_of(&info.file_name).or(declared_ext.map(str::to_string)) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    };
    data.media.put(&key, &bytes).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "key": key })))
}

pub async fn download(
    data: web::Data<AppState>,
    key: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    if !valid_key(&key) {
        return Err(ApiError::Validation("invalid media key".to_string()));
    }
    let bytes = data.media.get(&key).await?;
    Ok(HttpResponse::Ok()
        .content_type(content_type_for(&key))
        .body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::Actor;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;

    use crate::app_state::AppState;
    use crate::auth;
    use crate::config::Config;
    use crate::hub::Hub;
    use crate::memory::MemoryStore;

    fn test_state(media_dir: &std::path::Path) -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            media: Arc::new(LocalMediaStore::new(media_dir)),
            hub: Hub::new().start(),
            config: Config {
                store: "memory".to_string(),
                mongo_uri: String::new(),
                database_name: String::new(),
                jwt_secret: "test-secret".to_string(),
                media_dir: media_dir.display().to_string(),
                frontend_origin: "http://localhost:3000".to_string(),
            },
        }
    }

    #[::core::prelude::v1::test]
    fn key_validation_blocks_traversal() {
        assert!(valid_key("0b9e7d2c.jpg"));
        assert!(!valid_key("../etc/passwd"));
        assert!(!valid_key("a/b.png"));
        assert!(!valid_key(""));
    }

    #[::core::prelude::v1::test]
    fn extensions_are_normalized() {
        assert_eq!(extension_of("Bike.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("weird.tooolong"), None);
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("media-test-{}", Uuid::new_v4()));
        let store = LocalMediaStore::new(&dir);

        store.put("pic.png", b"bytes").await.unwrap();
        assert_eq!(store.get("pic.png").await.unwrap(), b"bytes");

        store.delete("pic.png").await.unwrap();
        assert!(matches!(
            store.get("pic.png").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
        // Deleting a missing object is a no-op.
        store.delete("pic.png").await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[actix_web::test]
    async fn upload_takes_full_size_photos_and_enforces_the_cap() {
        let dir = std::env::temp_dir().join(format!("media-test-{}", Uuid::new_v4()));
        let state = test_state(&dir);
        let token = auth::create_jwt("uploader", &state.config.jwt_secret).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(crate::Authentication::new("test-secret".to_string()))
                .service(
                    web::scope("/media")
                        .app_data(json_config())
                        .route("", web::post().to(upload)),
                ),
        )
        .await;

        // 3 MiB: well past the framework's default JSON body limit.
        let body = serde_json::json!({
            "file_name": "shoot.jpg",
            "data": BASE64.encode(vec![0u8; 3 * 1024 * 1024]),
        });
        let req = test::TestRequest::post()
            .uri("/media")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Past the 10 MiB cap: rejected by the handler, not the codec.
        let body = serde_json::json!({
            "file_name": "shoot.jpg",
            "data": BASE64.encode(vec![0u8; MAX_MEDIA_BYTES + 1]),
        });
        let req = test::TestRequest::post()
            .uri("/media")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[actix_web::test]
    async fn declared_content_type_is_validated_and_names_the_key() {
        use actix_web::HttpMessage;

        let dir = std::env::temp_dir().join(format!("media-test-{}", Uuid::new_v4()));
        let state = web::Data::new(test_state(&dir));

        let req = test::TestRequest::default().to_http_request();
        req.extensions_mut().insert("uploader".to_string());

        let err = upload(
            req.clone(),
            state.clone(),
            web::Json(UploadRequest {
                file_name: "notes.pdf".to_string(),
                content_type: Some("application/pdf".to_string()),
                data: BASE64.encode(b"%PDF"),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // No extension on the file name: the declared type supplies it.
        let resp = upload(
            req,
            state,
            web::Json(UploadRequest {
                file_name: "photo".to_string(),
                content_type: Some("image/png".to_string()),
                data: BASE64.encode(b"pngbytes"),
            }),
        )
        .await
        .unwrap();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["key"].as_str().unwrap().ends_with(".png"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
