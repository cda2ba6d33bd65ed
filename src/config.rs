// src/config.rs

use std::env;
use dotenvy::dotenv;

use crate::{error::AppError, models::question::Section};

/// Maximum number of attempts a student (by email) may make on a single test.
pub const MAX_ATTEMPTS: i32 = 2;

/// Storage key under which the attempt-session store snapshot is persisted.
pub const SESSION_STORAGE_KEY: &str = "student-test-storage";

/// Sections in the order a student works through them.
pub const SECTION_ORDER: [Section; 2] = [Section::Verbal, Section::Quant];

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let jwt_expiration = match env::var("JWT_EXPIRATION") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                AppError::InternalServerError(format!("JWT_EXPIRATION is not a number: {raw}"))
            })?,
            Err(_) => 86_400,
        };

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok().filter(|v| !v.is_empty());
        let admin_password = env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty());

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            admin_username,
            admin_password,
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::InternalServerError(format!("{key} must be set")))
}
