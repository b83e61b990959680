use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = String;

/// Filename sentinel for accounts that never uploaded a profile picture.
pub const DEFAULT_PROFILE_IMAGE: &str = "default.png";

/// Stored account record. Never serialized into a response body; the
/// login/identity DTOs below carry the client-facing subset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub user_id: Id,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(rename = "profileImage")]
    pub profile_image: String,
    /// Advisory copy of the last-issued token. Validity is always decided by
    /// signature and expiry, never by comparison against this field.
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Slide {
    pub id: Id,
    pub description: String,
    pub image: Option<String>,
}

/// Pending payment, keyed by the MD5 digest of its QR payload. No settlement
/// flag is stored; status is re-derived from the payment network on demand.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PaymentRecord {
    pub digest: String,
    pub payload: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

// ---------------- Request / response bodies ----------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub token: String,
    pub name: String,
    pub email: String,
    pub user_id: Id,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "profileImage")]
    pub profile_image: String,
    pub user_id: Id,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    pub user_id: Id,
    pub name: String,
    pub email: String,
    #[serde(rename = "profileImage")]
    pub profile_image: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CartQrRequest {
    pub product_ids: Vec<Id>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QrResponse {
    pub qr_image_base64_uri: String,
    pub md5: String,
    pub amount: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub payment_status: String,
    pub md5: String,
    pub qrstring: String,
    pub amount: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductPage {
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub total_count: u64,
    pub products: Vec<Product>,
}
