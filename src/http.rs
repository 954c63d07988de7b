//! HTTP surface
//!
//! Routes, bearer-token extraction, and request handlers. Handlers validate
//! the session first, construct a mail service around the returned credential
//! handle, delegate to it, and shape the response; error conversion lives in
//! [`crate::errors`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::agent::{self, AgentRuntime};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::gmail::GmailClient;
use crate::models::{
    ActionResponse, CallbackQuery, ChatRequest, ChatResponse, ListMessagesQuery,
    ListMessagesResponse, LogoutResponse, MessageAction, MessageActionRequest, MessageDetail,
    OauthUrlResponse, ThreadMessage, UserDataResponse,
};
use crate::service::MailService;
use crate::session::{AuthHandle, SessionManager};

/// Shared application state injected into every handler
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration
    pub config: Arc<Config>,
    /// Shared provider transport
    pub gmail: GmailClient,
    /// Session and credential lifecycle manager
    pub sessions: Arc<SessionManager>,
    /// Chat agent runtime, absent when not configured
    pub runtime: Option<Arc<dyn AgentRuntime>>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/auth/oauth-url", get(oauth_url))
        .route("/api/auth/callback", get(oauth_callback))
        .route("/api/auth/logout", post(logout))
        .route("/api/gmail/messages", get(list_messages))
        .route("/api/gmail/message/{message_id}", get(message_detail))
        .route("/api/gmail/message/{message_id}/thread", get(message_thread))
        .route("/api/gmail/message/{message_id}/action", post(message_action))
        .route("/api/gmail/user-data", get(user_data))
        .route("/api/gmail/chat", post(chat))
        .with_state(state)
}

/// Liveness probe
async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "gmail gateway api running" }))
}

/// Issue the provider authorization URL
async fn oauth_url(State(state): State<AppState>) -> AppResult<Json<OauthUrlResponse>> {
    let authorization_url = state.sessions.authorization_url().await;
    Ok(Json(OauthUrlResponse { authorization_url }))
}

/// Handle the OAuth callback and redirect to the frontend with the token
async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Redirect> {
    if let Some(error) = query.error {
        return Err(AppError::invalid(format!("oauth error: {error}")));
    }
    let code = query
        .code
        .ok_or_else(|| AppError::invalid("authorization code required"))?;
    let oauth_state = query
        .state
        .ok_or_else(|| AppError::invalid("state parameter required"))?;

    let session_token = state.sessions.handle_callback(&code, &oauth_state).await?;
    let target = format!(
        "{}?token={}",
        state.config.post_login_redirect,
        urlencoding::encode(&session_token)
    );
    Ok(Redirect::to(&target))
}

/// Remove the caller's session
///
/// Removal is unconditional for whatever token is presented; an expired or
/// unknown token simply reports `removed: false`.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<LogoutResponse>> {
    let token = bearer_token(&headers)?;
    let removed = state.sessions.logout(token).await;
    Ok(Json(LogoutResponse { removed }))
}

/// List/search messages with optional label filter and pagination cursor
async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListMessagesQuery>,
) -> AppResult<Json<ListMessagesResponse>> {
    let auth = authenticate(&state, &headers).await?;
    let service = MailService::new(&state.gmail, &auth);

    let label_ids = match &query.label {
        Some(name) => vec![service.resolve_label_id(name).await?],
        None => Vec::new(),
    };
    let provider_query = (!query.query.is_empty()).then_some(query.query.as_str());
    let listing = service
        .search_page(
            provider_query,
            &label_ids,
            query.cursor,
            Some(query.max_results),
        )
        .await?;

    Ok(Json(ListMessagesResponse {
        total_count: listing.items.len(),
        messages: listing.items,
        next_cursor: listing.next_cursor,
    }))
}

/// Fetch one shaped message detail
async fn message_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
) -> AppResult<Json<MessageDetail>> {
    let auth = authenticate(&state, &headers).await?;
    let service = MailService::new(&state.gmail, &auth);
    Ok(Json(service.get_detail(&message_id).await?))
}

/// Assemble the conversation a message belongs to
async fn message_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
) -> AppResult<Json<Vec<ThreadMessage>>> {
    let auth = authenticate(&state, &headers).await?;
    let service = MailService::new(&state.gmail, &auth);
    Ok(Json(service.get_message_thread(&message_id).await?))
}

/// Apply a discriminated action to one message
async fn message_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
    Json(request): Json<MessageActionRequest>,
) -> AppResult<Json<ActionResponse>> {
    let auth = authenticate(&state, &headers).await?;
    let service = MailService::new(&state.gmail, &auth);

    match MessageAction::parse(&request)? {
        MessageAction::Trash => service.trash(&message_id).await?,
        MessageAction::Archive => {
            service
                .modify_labels(&message_id, &[], &["INBOX".to_owned()])
                .await?
        }
        MessageAction::MarkRead => {
            service
                .modify_labels(&message_id, &[], &["UNREAD".to_owned()])
                .await?
        }
        MessageAction::AddLabel(name) => {
            let label_id = service.resolve_label_id(&name).await?;
            service.modify_labels(&message_id, &[label_id], &[]).await?
        }
    }

    Ok(Json(ActionResponse {
        success: true,
        action: request.action_type,
    }))
}

/// Labels plus aggregate stats for UI bootstrap
async fn user_data(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<UserDataResponse>> {
    let auth = authenticate(&state, &headers).await?;
    let service = MailService::new(&state.gmail, &auth);

    let (labels, stats) = futures::join!(service.list_labels(), service.get_stats());
    Ok(Json(UserDataResponse {
        user: auth.user.clone(),
        labels: labels?,
        stats: stats?,
    }))
}

/// Route free-text input through the agent runtime
async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    let auth = authenticate(&state, &headers).await?;
    let runtime = state.runtime.as_ref().ok_or_else(|| {
        AppError::invalid(
            "chat assistant is not configured; set GMAIL_GATEWAY_AGENT_BASE_URL",
        )
    })?;
    let max_iterations = state
        .config
        .agent
        .as_ref()
        .map(|agent| agent.max_iterations)
        .unwrap_or(3);

    let service = MailService::new(&state.gmail, &auth);
    let outcome =
        agent::run_chat(runtime.as_ref(), &service, &request.message, max_iterations).await?;
    Ok(Json(ChatResponse {
        response: outcome.response,
        action_taken: outcome.action_taken,
    }))
}

/// Validate the bearer token through the session manager
async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<AuthHandle> {
    let token = bearer_token(headers)?;
    state.sessions.validate(token).await
}

/// Extract the bearer token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated("missing bearer token".to_owned()))?;
    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthenticated("authorization header must use the Bearer scheme".to_owned())
        })
}
