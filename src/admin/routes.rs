use std::net::SocketAddr;
use std::sync::Arc;

use askama::Template;
use axum::Form;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

// Templates

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    limits: String,
    tracked_users: usize,
    blocked_users: usize,
    users: Vec<UserRow>,
    tokens: Vec<TokenRow>,
    message: Option<String>,
}

struct UserRow {
    user_id: i64,
    requests_last_minute: usize,
    requests_last_hour: usize,
    daily_logins: u32,
    blocked: bool,
    status: String,
}

struct TokenRow {
    token: String,
    label: String,
    created_at: String,
    expires_at: String,
    revoked: bool,
}

// Form structs

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct IssueTokenForm {
    label: String,
    expires_at: Option<String>,
}

// Cookie helpers

fn session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|c| {
            let c = c.trim();
            c.strip_prefix("session=").map(|v| v.to_string())
        })
}

fn session_cookie(token: &str) -> String {
    format!("session={}; HttpOnly; SameSite=Strict; Path=/admin", token)
}

fn expire_session_cookie() -> String {
    "session=; HttpOnly; SameSite=Strict; Path=/admin; Max-Age=0".to_string()
}

async fn has_valid_session(state: &AppState, headers: &axum::http::HeaderMap) -> bool {
    match session_token(headers) {
        Some(token) => state.sessions.lock().await.validate(&token),
        None => false,
    }
}

async fn render_dashboard(state: &AppState, message: Option<String>) -> Html<String> {
    let now = Utc::now();
    let (activity, limits) = {
        let guard = state.guard.lock().await;
        let l = guard.limits();
        let limits = format!(
            "{} requests/min, {} requests/hour, {} logins/day, {} min block",
            l.max_requests_per_minute,
            l.max_requests_per_hour,
            l.max_logins_per_day,
            l.block_duration_secs / 60
        );
        (guard.snapshot(now), limits)
    };

    let blocked_users = activity.iter().filter(|a| a.blocked_until.is_some()).count();
    let tracked_users = activity.len();
    let users = activity
        .into_iter()
        .map(|a| {
            let (blocked, status) = match a.blocked_until {
                Some(until) => {
                    let minutes = (until - now).num_seconds() / 60;
                    (true, format!("blocked, {} min left", minutes))
                }
                None => (false, "active".to_string()),
            };
            UserRow {
                user_id: a.user_id,
                requests_last_minute: a.requests_last_minute,
                requests_last_hour: a.requests_last_hour,
                daily_logins: a.daily_logins,
                blocked,
                status,
            }
        })
        .collect();

    let tokens = state
        .tokens
        .read()
        .await
        .list()
        .iter()
        .map(|t| TokenRow {
            token: t.token.clone(),
            label: t.label.clone(),
            created_at: t.created_at.format("%Y-%m-%d %H:%M").to_string(),
            expires_at: t
                .expires_at
                .map(|e| e.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string()),
            revoked: t.revoked,
        })
        .collect();

    Html(
        DashboardTemplate {
            limits,
            tracked_users,
            blocked_users,
            users,
            tokens,
            message,
        }
        .render()
        .unwrap_or_default(),
    )
}

// Handlers

pub async fn admin_login_page() -> impl IntoResponse {
    Html(LoginTemplate { error: None }.render().unwrap_or_default())
}

pub async fn admin_login_submit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<LoginForm>,
) -> Response {
    let ip = addr.ip();

    // Locked-out IPs do not get their credentials checked at all.
    {
        let mut lockout = state.lockout.lock().await;
        if lockout.is_locked(&ip) {
            let html = LoginTemplate {
                error: Some("Too many failed attempts. Please try again later.".into()),
            }
            .render()
            .unwrap_or_default();
            return (StatusCode::FORBIDDEN, Html(html)).into_response();
        }
    }

    if form.username == state.admin.username && form.password == state.admin.password {
        state.lockout.lock().await.record_success(&ip);
        let session = state.sessions.lock().await.create();
        let cookie = session_cookie(&session.token);
        tracing::info!("admin login from {}", ip);
        (
            [(axum::http::header::SET_COOKIE, cookie)],
            Redirect::to("/admin"),
        )
            .into_response()
    } else {
        state.lockout.lock().await.record_failure(ip);
        tracing::warn!("failed admin login from {}", ip);
        let html = LoginTemplate {
            error: Some("Invalid username or password.".into()),
        }
        .render()
        .unwrap_or_default();
        (StatusCode::UNAUTHORIZED, Html(html)).into_response()
    }
}

pub async fn admin_dashboard(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Response {
    if !has_valid_session(&state, &headers).await {
        return Redirect::to("/admin/login").into_response();
    }
    render_dashboard(&state, None).await.into_response()
}

pub async fn admin_logout(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.lock().await.remove(&token);
    }
    (
        [(axum::http::header::SET_COOKIE, expire_session_cookie())],
        Redirect::to("/admin/login"),
    )
        .into_response()
}

pub async fn admin_issue_token(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Form(form): Form<IssueTokenForm>,
) -> Result<Response, AppError> {
    if !has_valid_session(&state, &headers).await {
        return Ok(Redirect::to("/admin/login").into_response());
    }

    let label = form.label.trim().to_string();
    if label.is_empty() {
        let html = render_dashboard(&state, Some("Token label must not be empty.".into())).await;
        return Ok(html.into_response());
    }

    let expires_at = match form.expires_at.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
            Ok(dt) => Some(dt.and_utc()),
            Err(_) => {
                let html = render_dashboard(
                    &state,
                    Some("Invalid expiration, expected YYYY-MM-DDTHH:MM.".into()),
                )
                .await;
                return Ok(html.into_response());
            }
        },
        None => None,
    };

    let token = state.tokens.write().await.issue(label, expires_at)?;
    tracing::info!("issued service token '{}'", token.label);
    let html = render_dashboard(&state, Some(format!("Token created: {}", token.token))).await;
    Ok(html.into_response())
}

pub async fn admin_revoke_token(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    if !has_valid_session(&state, &headers).await {
        return Ok(Redirect::to("/admin/login").into_response());
    }

    let revoked = state.tokens.write().await.revoke(&token)?;
    if revoked {
        tracing::info!("revoked a service token");
    }
    Ok(Redirect::to("/admin").into_response())
}

pub async fn admin_unblock_user(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(user_id): Path<i64>,
) -> Response {
    if !has_valid_session(&state, &headers).await {
        return Redirect::to("/admin/login").into_response();
    }

    let cleared = state.guard.lock().await.clear_block(user_id);
    let message = if cleared {
        tracing::info!(user_id, "admin cleared block");
        format!("Block cleared for user {}.", user_id)
    } else {
        format!("User {} has no active block.", user_id)
    };
    render_dashboard(&state, Some(message)).await.into_response()
}

pub async fn admin_reset_user(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(user_id): Path<i64>,
) -> Response {
    if !has_valid_session(&state, &headers).await {
        return Redirect::to("/admin/login").into_response();
    }

    state.guard.lock().await.reset_user(user_id);
    tracing::info!(user_id, "admin reset user state");
    render_dashboard(&state, Some(format!("Cleared tracked state for user {}.", user_id)))
        .await
        .into_response()
}
