use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orario_booking::{Requester, RequesterRole};

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    /// Subject as a user id. Guest tokens carry non-uuid subjects and
    /// fail here; use `user_id().ok()` where guests are acceptable.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| {
            AppError::AuthenticationError("subject is not a valid user id".to_string())
        })
    }

    /// Engine-facing requester identity.
    pub fn requester(&self) -> Result<Requester, AppError> {
        let user_id = self.user_id()?;
        let role = match self.role.as_str() {
            "customer" => RequesterRole::Customer,
            "provider" => RequesterRole::Provider,
            other => {
                return Err(AppError::AuthorizationError(format!(
                    "unknown role: {}",
                    other
                )))
            }
        };
        Ok(Requester { user_id, role })
    }
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(e.to_string()))?;

    Ok(token_data.claims)
}
