// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use gre_practice::config::Config;
use gre_practice::error::AppError;
use gre_practice::repository::{Repository, postgres::PgRepository};
use gre_practice::routes;
use gre_practice::state::AppState;
use gre_practice::utils::{hash::hash_password, jwt::ADMIN_ROLE};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Also loads .env (if present)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let pool = connect_with_retry(&config.database_url).await?;
    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied successfully.");

    let repo = PgRepository::new(pool);

    if let Err(e) = seed_admin_user(&repo, &config).await {
        tracing::error!("Failed to seed admin user: {}", e);
    }

    let state = AppState {
        repo: Arc::new(repo),
        config: config.clone(),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_with_retry(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if retry_count >= 5 => {
                tracing::error!("Failed to connect to database after 5 retries: {}", e);
                return Err(e);
            }
            Err(_) => {
                retry_count += 1;
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

async fn seed_admin_user(repo: &PgRepository, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if repo.find_user_by_username(username).await?.is_none() {
        tracing::info!("Seeding admin user: {}", username);
        let hashed_password = hash_password(password)?;
        repo.create_user(username, &hashed_password, ADMIN_ROLE).await?;
        tracing::info!("Admin user created successfully.");
    }
    Ok(())
}
