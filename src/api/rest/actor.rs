use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Actor, Role};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Identity resolved upstream by the session layer and forwarded as headers.
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
        };

        let user_id = Uuid::parse_str(&header(ACTOR_ID_HEADER)?)
            .map_err(|_| AppError::Unauthorized(format!("invalid {ACTOR_ID_HEADER} header")))?;

        let role = match header(ACTOR_ROLE_HEADER)?.as_str() {
            "resident" => Role::Resident,
            "staff" => Role::Staff,
            "admin" => Role::Admin,
            other => {
                return Err(AppError::Unauthorized(format!("unknown role {other}")));
            }
        };

        Ok(CurrentActor(Actor { user_id, role }))
    }
}
