use std::sync::Arc;

use metrics::increment_counter;
use tracing::info;
use uuid::Uuid;

use crate::models::{User, DEFAULT_PROFILE_IMAGE};
use crate::repo::{Repo, RepoError};
use crate::storage::{unique_filename, ImageStore, StoreError};
use crate::token::{TokenCodec, TokenError};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("user already exists")]
    DuplicateEmail,
    // One constant message for unknown email and wrong password, so responses
    // cannot be used to probe which addresses have accounts.
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("storage failure: {0}")]
    Store(String),
    #[error("password hashing failure")]
    Hash,
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e.to_string())
    }
}

/// Token plus the freshly persisted user record it belongs to.
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

pub struct UploadedImage {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

pub struct ProfileUpdate {
    pub user_id: String,
    pub name: String,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub new_image: Option<UploadedImage>,
}

/// Registration, login, profile maintenance and token validation over the
/// user store. Holds its collaborators explicitly; nothing global.
pub struct AuthService {
    repo: Arc<dyn Repo>,
    images: Arc<dyn ImageStore>,
    codec: TokenCodec,
}

impl AuthService {
    pub fn new(repo: Arc<dyn Repo>, images: Arc<dyn ImageStore>, codec: TokenCodec) -> Self {
        Self { repo, images, codec }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let password_hash =
            bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| AuthError::Hash)?;
        let user_id = Uuid::new_v4().to_string();
        let token = self.codec.issue(&user_id)?;

        let user = User {
            user_id,
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            profile_image: DEFAULT_PROFILE_IMAGE.to_string(),
            token: Some(token.clone()),
        };
        match self.repo.create_user(user.clone()).await {
            Ok(()) => {}
            Err(RepoError::Conflict) => return Err(AuthError::DuplicateEmail),
            Err(e) => return Err(e.into()),
        }
        increment_counter!("auth_registrations_total");
        info!(user_id = %user.user_id, "registered new user");
        Ok(AuthSession { token, user })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let mut user = self
            .repo
            .find_user_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let ok = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }
        let token = self.codec.issue(&user.user_id)?;
        self.repo.set_user_token(&user.user_id, &token).await?;
        user.token = Some(token.clone());
        increment_counter!("auth_logins_total");
        info!(user_id = %user.user_id, "user logged in");
        Ok(AuthSession { token, user })
    }

    /// Verify the token, then re-read the user so the caller always gets the
    /// current record. Claims are trusted for the user id only.
    pub async fn validate_token(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.codec.verify(token)?;
        self.repo
            .find_user(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, AuthError> {
        let mut user = self
            .repo
            .find_user(&update.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if let Some(new_password) = &update.new_password {
            let old = update.old_password.as_deref().unwrap_or_default();
            let ok = bcrypt::verify(old, &user.password_hash).unwrap_or(false);
            if !ok {
                return Err(AuthError::InvalidCredentials);
            }
            user.password_hash =
                bcrypt::hash(new_password, bcrypt::DEFAULT_COST).map_err(|_| AuthError::Hash)?;
        }

        if let Some(image) = update.new_image {
            let filename = unique_filename(&image.original_name);
            self.images.save(&filename, &image.bytes).await?;
            if user.profile_image != DEFAULT_PROFILE_IMAGE {
                self.images.delete(&user.profile_image).await?;
            }
            user.profile_image = filename;
        }

        user.name = update.name;
        self.repo.update_user(&user).await?;
        info!(user_id = %user.user_id, "profile updated");
        Ok(user)
    }
}
