use std::env;

#[derive(Clone)]
pub struct Config {
    pub store: String,
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub media_dir: String,
    pub frontend_origin: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            // "mongo" (default) or "memory" to run without a database
            store: env::var("STORE").unwrap_or_else(|_| "mongo".to_string()),
            mongo_uri: env::var("MONGO_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "bikeshot".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            media_dir: env::var("MEDIA_DIR").unwrap_or_else(|_| "./media".to_string()),
            frontend_origin: env::var("FRONTEND_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }
}
