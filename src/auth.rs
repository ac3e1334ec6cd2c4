//! Bearer-token authentication. Tokens are issued elsewhere; here they are
//! only verified and resolved to a stored user.

use crate::{error::ApiError, models::User, state::AppState};
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication credentials were not provided")]
    MissingToken,
    #[error("Given token not valid")]
    InvalidToken,
    #[error("User not found")]
    UnknownUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub exp: usize,
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "token validation failed");
            AuthError::InvalidToken
        })
}

/// The authenticated caller, loaded fresh from the store on every request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::MissingToken)?;
        let claims = decode_token(bearer.token(), &state.config.jwt_secret)?;

        let user = state
            .store
            .find_user(claims.user_id)
            .await?
            .ok_or(AuthError::UnknownUser)?;
        Ok(CurrentUser(user))
    }
}

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }

    pub fn require_superuser(&self) -> Result<(), ApiError> {
        if self.0.is_superuser {
            Ok(())
        } else {
            Err(ApiError::forbidden("Superuser privileges required"))
        }
    }

    pub fn company_id(&self) -> Result<i64, ApiError> {
        self.0
            .company_id
            .ok_or_else(|| ApiError::bad_request("You do not belong to any company"))
    }

    /// Company of an admin caller.
    pub fn admin_company_id(&self) -> Result<i64, ApiError> {
        let company_id = self.company_id()?;
        if self.0.is_admin {
            Ok(company_id)
        } else {
            Err(ApiError::forbidden("Only company admins can manage the team"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(user_id: i64, secret: &str, exp: usize) -> String {
        encode(
            &Header::default(),
            &Claims { user_id, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn valid_token_decodes() {
        let claims = decode_token(&token(7, "s3cret", future()), "s3cret").unwrap();
        assert_eq!(claims.user_id, 7);
    }

    #[test]
    fn wrong_secret_or_expired_token_is_rejected() {
        assert!(matches!(
            decode_token(&token(7, "other", future()), "s3cret"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(decode_token(&token(7, "s3cret", 1_000), "s3cret"), Err(AuthError::InvalidToken)));
        assert!(matches!(decode_token("garbage", "s3cret"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn role_helpers() {
        let user = User {
            id: 1,
            email: "a@b.c".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            company_id: None,
            is_admin: true,
            is_superuser: false,
        };
        let caller = CurrentUser(user.clone());
        assert!(caller.require_superuser().is_err());
        assert!(matches!(caller.company_id(), Err(ApiError::BadRequest(_))));

        let caller = CurrentUser(User { company_id: Some(3), ..user });
        assert_eq!(caller.admin_company_id().unwrap(), 3);
    }
}
