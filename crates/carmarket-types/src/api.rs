use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{ApplicationStatus, CarStatus, Role};
use crate::validation::{validate_password, validate_username};

// -- Auth --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(custom(
        function = "validate_username",
        message = "Username must be 3-32 letters, digits, spaces, '-' or '_' and start with a letter."
    ))]
    pub username: String,
    #[validate(custom(
        function = "validate_password",
        message = "Password needs 8+ characters with upper and lower case letters, a digit and a special character."
    ))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

// -- Users (admin) --

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    #[serde(default)]
    #[validate(custom(
        function = "validate_username",
        message = "Username must be 3-32 letters, digits, spaces, '-' or '_' and start with a letter."
    ))]
    pub username: Option<String>,
    #[serde(default)]
    #[validate(custom(
        function = "validate_password",
        message = "Password needs 8+ characters with upper and lower case letters, a digit and a special character."
    ))]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// -- Cars & applications --

/// Catalog filters. Blank values are treated as absent.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CarQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub server: Option<String>,
}

impl CarQuery {
    fn non_blank(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn search(&self) -> Option<&str> {
        Self::non_blank(&self.search)
    }

    pub fn category(&self) -> Option<&str> {
        Self::non_blank(&self.category)
    }

    pub fn server(&self) -> Option<&str> {
        Self::non_blank(&self.server)
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateCarStatusRequest {
    pub status: CarStatus,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReviewApplicationRequest {
    pub status: ApplicationStatus,
}

// -- Favorites --

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToggleFavoriteRequest {
    pub car_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteStatus {
    pub car_id: Uuid,
    pub favorited: bool,
}

// -- Messages --

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub car_id: Uuid,
    pub recipient_id: Uuid,
    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters."))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkConversationReadRequest {
    pub car_id: Uuid,
    pub other_user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedRead {
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub count: i64,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attempts_left: Option<u32>,
}
