use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod admin;
mod api;
mod config;
mod error;
mod guard;
mod state;
mod token;

use admin::lockout::LoginLockout;
use admin::session::SessionStore;
use config::Config;
use guard::limiter::AbuseGuard;
use guard::pacing::HumanPacing;
use state::AppState;
use token::store::ServiceTokenStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let tokens = ServiceTokenStore::load_or_create(&config.tokens_path)?;

    let state = Arc::new(AppState {
        guard: tokio::sync::Mutex::new(AbuseGuard::new(config.limits.clone())),
        pacing: HumanPacing::new(&config.pacing),
        tokens: tokio::sync::RwLock::new(tokens),
        admin: config.admin,
        sessions: tokio::sync::Mutex::new(SessionStore::new()),
        lockout: tokio::sync::Mutex::new(LoginLockout::new()),
    });

    let app = Router::new()
        // Decision API for the bot frontend
        .route(
            "/api/evaluate",
            get(api::evaluate::evaluate_get).post(api::evaluate::evaluate_post),
        )
        .route("/api/pacing", get(api::evaluate::pacing_delay))
        // Admin routes
        .route("/admin", get(admin::routes::admin_dashboard))
        .route(
            "/admin/login",
            get(admin::routes::admin_login_page).post(admin::routes::admin_login_submit),
        )
        .route("/admin/logout", post(admin::routes::admin_logout))
        .route("/admin/tokens", post(admin::routes::admin_issue_token))
        .route(
            "/admin/tokens/{token}/revoke",
            post(admin::routes::admin_revoke_token),
        )
        .route(
            "/admin/users/{user_id}/unblock",
            post(admin::routes::admin_unblock_user),
        )
        .route(
            "/admin/users/{user_id}/reset",
            post(admin::routes::admin_reset_user),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("LoginGuard server listening on {}", config.bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
