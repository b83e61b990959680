use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::auth::AuthError;
use crate::payment::PaymentError;
use crate::repo::RepoError;
use crate::storage::StoreError;
use crate::token::TokenError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Transport-level failure taxonomy. Services return their own error enums;
/// everything funnels into this at the handler boundary.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unauthorized")] Unauthorized,
    #[error("invalid token")] InvalidToken,
    #[error("token expired")] ExpiredToken,
    #[error("user not found")] UserNotFound,
    #[error("user already exists")] DuplicateEmail,
    #[error("incorrect email or password")] InvalidCredentials,
    #[error("product not found")] ProductNotFound,
    #[error("not found")] NotFound,
    #[error("payment network failure")] ExternalService,
    #[error("{0}")] Validation(String),
    #[error("unsupported media type")] UnsupportedMedia,
    #[error("too many requests")] RateLimited,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::DuplicateEmail,
            RepoError::Internal(_) => ApiError::Internal,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => ApiError::ExpiredToken,
            TokenError::Invalid => ApiError::InvalidToken,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Other(_) => ApiError::Internal,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::DuplicateEmail => ApiError::DuplicateEmail,
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::UserNotFound => ApiError::UserNotFound,
            AuthError::Token(t) => t.into(),
            AuthError::Repo(r) => r.into(),
            AuthError::Store(_) | AuthError::Hash => ApiError::Internal,
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::EmptyCart => {
                ApiError::Validation("cart must contain at least one product".into())
            }
            PaymentError::ProductNotFound(_) => ApiError::ProductNotFound,
            PaymentError::RecordNotFound => ApiError::NotFound,
            PaymentError::Network(_) => ApiError::ExternalService,
            PaymentError::Render(_) => ApiError::Internal,
            PaymentError::Repo(r) => r.into(),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Unauthorized | ApiError::InvalidToken | ApiError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::UserNotFound | ApiError::ProductNotFound | ApiError::NotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::DuplicateEmail
            | ApiError::InvalidCredentials
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ExternalService => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
