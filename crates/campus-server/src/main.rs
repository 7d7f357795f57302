mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use campus_api::auth::{self, AppState, AppStateInner, SentinelAdmin};
use campus_api::storage::Storage;
use campus_db::Database;
use campus_types::models::Role;

use crate::config::{SeedAdmin, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "campus=debug,campus_api=debug,campus_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env();
    if !config.jwt_secret_is_usable() {
        eprintln!("FATAL: CAMPUS_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db = Database::open(&config.db_path)?;
    let storage = Storage::new(config.upload_dir.clone()).await?;

    if let Some(seed) = &config.seed_admin {
        seed_admin(&db, seed)?;
    }

    let sentinel = SentinelAdmin {
        aliases: config.admin_aliases.clone(),
        secret: config.admin_secret.clone(),
    };
    if sentinel.secret.is_none() {
        warn!("CAMPUS_ADMIN_SECRET not set, sentinel admin login disabled");
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        sentinel,
        storage,
    });

    let app = campus_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    info!("Campus server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the configured ADMIN account unless its email is already taken.
fn seed_admin(db: &Database, seed: &SeedAdmin) -> anyhow::Result<()> {
    let email = auth::normalize_email(&seed.email);
    if db.get_user_by_email(&email)?.is_some() {
        info!("Seed admin {} already present", email);
        return Ok(());
    }
    let hash = auth::hash_password(&seed.password)?;
    match db.create_user(&email, &seed.username, &hash, Role::Admin)? {
        Some(id) => info!("Seeded admin account {} (id {})", email, id),
        None => info!("Seed admin {} already present", email),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
