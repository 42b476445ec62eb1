mod app_state;
mod auth;
mod completion;
mod config;
mod conversations;
mod error;
mod hub;
mod media;
mod memory;
mod messages;
mod models;
mod mongo;
mod portfolios;
mod reviews;
mod store;
mod users;
mod ws;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures_util::future::{ok, Ready};
use log::info;

use crate::app_state::AppState;
use crate::media::{LocalMediaStore, MediaStore};
use crate::memory::MemoryStore;
use crate::mongo::{MongoDB, MongoStore};
use crate::store::ConversationStore;

/// Decodes a bearer token, if present, and stashes the user id in
/// request extensions. Requests without a token pass through; handlers
/// that need an identity reject them themselves.
pub struct Authentication {
    secret: String,
}

impl Authentication {
    pub fn new(secret: String) -> Self {
        Authentication { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if let Some(token) = auth_str.strip_prefix("Bearer ") {
                    match auth::verify_jwt(token.trim(), &self.secret) {
                        Ok(user_id) => {
                            req.extensions_mut().insert(user_id);
                        }
                        Err(_) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .json(serde_json::json!({ "error": "invalid token" }))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let store: Arc<dyn ConversationStore> = if config.store == "memory" {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let db = MongoDB::init(&config.mongo_uri, &config.database_name).await;
        let store = MongoStore::new(db);
        store
            .ensure_indexes()
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        Arc::new(store)
    };
    std::fs::create_dir_all(&config.media_dir)?;
    let media: Arc<dyn MediaStore> = Arc::new(LocalMediaStore::new(&config.media_dir));
    let hub = hub::Hub::new().start();

    info!("Server running at http://0.0.0.0:8080");
    info!("Allowed CORS origin: {}", config.frontend_origin);

    let state = AppState {
        store,
        media,
        hub,
        config: config.clone(),
    };

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&state.config.frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication::new(state.config.jwt_secret.clone()))
            .app_data(web::Data::new(state.clone()))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(auth::signup))
                    .route("/login", web::post().to(auth::login)),
            )
            .service(
                web::scope("/users")
                    .route("/find", web::get().to(users::find_user_by_email))
                    .route("/{user_id}", web::get().to(users::get_user))
                    .route("/{user_id}", web::put().to(users::update_user)),
            )
            .service(
                web::scope("/photographers")
                    .route("", web::get().to(users::list_photographers)),
            )
            .service(
                web::scope("/conversations")
                    .route("", web::post().to(conversations::start_conversation))
                    .route("", web::get().to(conversations::list_conversations))
                    .route(
                        "/{conversation_id}",
                        web::get().to(conversations::get_conversation),
                    )
                    .route(
                        "/{conversation_id}/messages",
                        web::get().to(messages::get_messages),
                    )
                    .route(
                        "/{conversation_id}/messages",
                        web::post().to(messages::create_message),
                    )
                    .route("/{conversation_id}/read", web::post().to(messages::mark_read))
                    .route(
                        "/{conversation_id}/complete",
                        web::post().to(conversations::complete_conversation),
                    )
                    .route(
                        "/{conversation_id}/cancel",
                        web::post().to(conversations::cancel_conversation),
                    ),
            )
            .service(web::scope("/unread").route("", web::get().to(messages::unread_total)))
            .service(
                web::scope("/reviews")
                    .route("/{user_id}/summary", web::get().to(reviews::review_summary))
                    .route("/{user_id}", web::get().to(reviews::list_reviews)),
            )
            .service(
                web::scope("/portfolios")
                    .route("", web::post().to(portfolios::create_portfolio))
                    .route(
                        "/{photographer_id}",
                        web::get().to(portfolios::list_portfolios),
                    )
                    .route(
                        "/{portfolio_id}",
                        web::delete().to(portfolios::delete_portfolio),
                    ),
            )
            .service(
                web::scope("/media")
                    .app_data(media::json_config())
                    .route("", web::post().to(media::upload))
                    .route("/{key}", web::get().to(media::download)),
            )
            .service(web::resource("/ws").route(web::get().to(ws::ws_index)))
    })
    .bind("0.0.0.0:8080")?
    .run()
    .await
}
