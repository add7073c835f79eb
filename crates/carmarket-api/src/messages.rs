use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use carmarket_types::api::{MarkConversationReadRequest, MarkedRead, SendMessageRequest, UnreadCount};
use carmarket_types::events::GatewayEvent;
use carmarket_types::models::{Message, User};

use crate::error::{ApiError, Result};
use crate::extract::{Path, Valid};
use crate::state::{AppState, run_db};

/// Messages are always about a car, and one side of the conversation must own it.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(sender): Extension<User>,
    Valid(req): Valid<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    if req.recipient_id == sender.id {
        return Err(ApiError::bad_request("You cannot message yourself."));
    }

    let sender_id = sender.id;
    let message = run_db(&state, move |db| {
        let Some(car) = db.get_car(req.car_id)? else {
            return Ok(Err(ApiError::not_found("Car not found.")));
        };
        if db.get_user_by_id(req.recipient_id)?.is_none() {
            return Ok(Err(ApiError::not_found("Recipient not found.")));
        }
        if car.created_by != sender_id && car.created_by != req.recipient_id {
            return Ok(Err(ApiError::bad_request(
                "Messages must involve the owner of the car.",
            )));
        }
        db.insert_message(Uuid::new_v4(), car.id, sender_id, req.recipient_id, &req.content)
            .map(Ok)
    })
    .await??;

    info!(message_id = %message.id, car_id = %message.car_id, "message sent");

    let delivered = state
        .dispatcher
        .send_to_user(
            message.recipient_id,
            GatewayEvent::NewMessage {
                car_id: message.car_id,
                car_name: message.car_name.clone(),
                sender_name: message.sender_name.clone(),
                message: message.clone(),
            },
        )
        .await;
    debug!(message_id = %message.id, sockets = delivered, "new_message pushed");

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Message>>> {
    let messages = run_db(&state, move |db| db.list_messages_for_user(user.id)).await?;
    Ok(Json(messages))
}

pub async fn conversation(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((car_id, other_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Message>>> {
    let messages = run_db(&state, move |db| db.list_conversation(car_id, user.id, other_id)).await?;
    Ok(Json(messages))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<UnreadCount>> {
    let count = run_db(&state, move |db| db.unread_count(user.id)).await?;
    Ok(Json(UnreadCount { count }))
}

/// Only the recipient may mark a message as read.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>> {
    let message = run_db(&state, move |db| {
        let Some(message) = db.get_message(id)? else {
            return Ok(Err(ApiError::not_found("Message not found.")));
        };
        if message.recipient_id != user.id {
            return Ok(Err(ApiError::forbidden("Only the recipient can mark a message as read.")));
        }
        db.mark_message_read(id)?;
        Ok(Ok(Message {
            is_read: true,
            ..message
        }))
    })
    .await??;

    Ok(Json(message))
}

/// Marks everything `other_user_id` sent the caller about the car.
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(req): Valid<MarkConversationReadRequest>,
) -> Result<Json<MarkedRead>> {
    let MarkConversationReadRequest { car_id, other_user_id } = req;
    let reader_id = user.id;
    let updated = run_db(&state, move |db| db.mark_conversation_read(car_id, reader_id, other_user_id)).await?;

    if updated > 0 {
        state
            .dispatcher
            .send_to_user(other_user_id, GatewayEvent::MessagesRead { car_id, reader_id })
            .await;
    }

    Ok(Json(MarkedRead { updated }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    if !run_db(&state, move |db| db.delete_message(id)).await? {
        return Err(ApiError::not_found("Message not found."));
    }
    info!(message_id = %id, deleted_by = %user.id, "message deleted");
    Ok(StatusCode::NO_CONTENT)
}
