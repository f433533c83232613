use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use super::extract::{AuthenticatedClient, SessionHeaders};
use super::AppState;
use crate::models::{Dialog, Message};
use crate::poll::{PollRequest, PollResult};

const DEFAULT_DIALOG_LIMIT: usize = 50;
const DEFAULT_MESSAGE_LIMIT: usize = 50;

fn parse_chat_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid chat_id"))
}

#[derive(Debug, Serialize)]
pub struct ChatsResponse {
    pub chats: Vec<Dialog>,
    pub count: usize,
}

pub async fn chats(client: AuthenticatedClient) -> ApiResult<Json<ChatsResponse>> {
    let chats = client.handle.dialogs(DEFAULT_DIALOG_LIMIT).await?;
    log::info!("Listed {} chats for {}", chats.len(), client.phone);
    Ok(Json(ChatsResponse {
        count: chats.len(),
        chats,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
    pub chat_id: String,
}

pub async fn messages(
    client: AuthenticatedClient,
    Path(chat_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    let id = parse_chat_id(&chat_id)?;
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let messages = client.handle.messages(id, limit).await?;
    log::info!("Fetched {} messages of chat {} for {}", messages.len(), id, client.phone);
    Ok(Json(MessagesResponse { messages, chat_id }))
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub chat_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub status: &'static str,
    pub message_id: i32,
    pub timestamp: DateTime<Utc>,
}

pub async fn send(
    client: AuthenticatedClient,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<Json<SendResponse>> {
    let Json(request) = payload.map_err(|_| ApiError::BadRequest("Invalid request"))?;
    let chat_id = parse_chat_id(&request.chat_id)?;
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Message text is empty"));
    }

    let message_id = client.handle.send_message(chat_id, &request.text).await?;
    log::info!("Sent message {} to chat {} for {}", message_id, chat_id, client.phone);
    Ok(Json(SendResponse {
        status: "sent",
        message_id,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub chat_id: String,
    #[serde(default)]
    pub message_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

pub async fn mark_read(
    client: AuthenticatedClient,
    payload: Result<Json<MarkReadRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(request) = payload.map_err(|_| ApiError::BadRequest("Invalid request"))?;
    let chat_id = parse_chat_id(&request.chat_id)?;
    let max_id = request
        .message_ids
        .iter()
        .copied()
        .max()
        .ok_or(ApiError::BadRequest("No message IDs provided"))?;

    client.handle.mark_read(chat_id, max_id).await?;
    Ok(Json(StatusResponse {
        status: "marked_read",
    }))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub after_message_id: Option<String>,
    pub timeout: Option<String>,
}

pub async fn poll(
    State(state): State<AppState>,
    auth: SessionHeaders,
    Path(chat_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<PollResult>> {
    let chat_id = parse_chat_id(&chat_id)?;
    let since_message_id = match query.after_message_id.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest("Invalid after_message_id"))?,
    };
    // Unparseable timeouts fall back to the default like out-of-range ones
    let timeout_secs = query.timeout.as_deref().and_then(|t| t.trim().parse().ok());

    let result = state
        .dispatcher
        .long_poll(PollRequest {
            session: auth.session,
            chat_id,
            since_message_id,
            timeout_secs,
        })
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    pub token: Option<String>,
}

pub async fn photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((chat_id, message_id)): Path<(String, String)>,
    Query(query): Query<PhotoQuery>,
) -> ApiResult<impl IntoResponse> {
    let auth = match SessionHeaders::from_headers(&headers)? {
        Some(auth) => auth,
        None => {
            let token = query
                .token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or(ApiError::Unauthorized("Missing authentication"))?;
            SessionHeaders::from_token(token)?
        }
    };
    let chat_id = parse_chat_id(&chat_id)?;
    let message_id: i32 = message_id
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid message_id"))?;

    let handle = state.factory.create_client_from_blob(&auth.session).await?;
    let data = handle.photo(chat_id, message_id, state.media_timeout).await?;
    log::info!(
        "Served photo of message {} in chat {} for {} ({} bytes)",
        message_id,
        chat_id,
        auth.phone,
        data.len()
    );
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], data))
}
