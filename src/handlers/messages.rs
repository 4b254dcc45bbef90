use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response};
use crate::{
    errors::ServiceError,
    services::messages::{MessageView, ReplyRequest, SubmitMessageRequest},
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/messages",
    request_body = SubmitMessageRequest,
    responses(
        (status = 201, description = "Message received", body = MessageView),
        (status = 400, description = "Invalid message", body = crate::errors::ErrorResponse),
    ),
    tag = "messages"
)]
pub async fn submit_message(
    State(state): State<AppState>,
    Json(request): Json<SubmitMessageRequest>,
) -> Result<Response, ServiceError> {
    let message = state.services.messages.submit(request).await?;
    Ok(created_response(message))
}

#[utoipa::path(
    get,
    path = "/api/v1/messages",
    responses(
        (status = 200, description = "Inbox, newest first", body = [MessageView]),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "messages"
)]
pub async fn list_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<MessageView>>, ServiceError> {
    Ok(Json(state.services.messages.list().await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/messages/{id}/read",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message marked read", body = MessageView),
        (status = 404, description = "Message not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "messages"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageView>, ServiceError> {
    Ok(Json(state.services.messages.mark_read(message_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/messages/{id}/reply",
    params(("id" = Uuid, Path, description = "Message id")),
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply recorded", body = MessageView),
        (status = 400, description = "Empty reply", body = crate::errors::ErrorResponse),
        (status = 404, description = "Message not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "messages"
)]
pub async fn reply_to_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(request): Json<ReplyRequest>,
) -> Result<Json<MessageView>, ServiceError> {
    Ok(Json(
        state.services.messages.reply(message_id, request).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/messages/{id}",
    params(("id" = Uuid, Path, description = "Message id")),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 404, description = "Message not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "messages"
)]
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.messages.delete(message_id).await?;
    Ok(no_content_response())
}
