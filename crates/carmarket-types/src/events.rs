use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CarApplication, Message};

/// Events pushed FROM server TO client over `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// The socket is bound to this user
    Authenticated { user_id: Uuid },

    /// Someone wrote to the user about a listing
    NewMessage {
        car_id: Uuid,
        car_name: String,
        sender_name: String,
        message: Message,
    },

    /// The other participant read the conversation
    MessagesRead { car_id: Uuid, reader_id: Uuid },

    /// A moderator approved or rejected one of the user's applications
    ApplicationReviewed { application: CarApplication },

    /// A user came online or went offline
    UserStatusUpdate { user_id: Uuid, online: bool },
}

/// Commands sent FROM client TO server over `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GatewayCommand {
    /// Bind the socket to the user owning the session cookie
    Authenticate { user_id: Uuid },
}
