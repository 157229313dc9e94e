//! Request extractors.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_STAFF_HEADER: &str = "x-user-staff";

/// Identity set by the authenticating proxy in front of the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub is_staff: bool,
}

impl CurrentUser {
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.is_staff { Ok(()) } else { Err(ApiError::forbidden("Staff only")) }
    }

    pub fn can_see(&self, owner: Uuid) -> bool { self.is_staff || self.id == owner }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty());
        let id = header(USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Login required"))?
            .parse::<Uuid>()
            .map_err(|_| ApiError::unauthorized("Invalid user id"))?;
        Ok(Self {
            id,
            email: header(USER_EMAIL_HEADER).map(str::to_string),
            is_staff: header(USER_STAFF_HEADER).is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}
