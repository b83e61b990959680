use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthService, ProfileUpdate, UploadedImage};
use crate::error::ApiError;
use crate::models::*;
use crate::payment::PaymentQrService;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::storage::{unique_filename, ImageStore};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/logout").route(web::post().to(logout)))
        .service(web::resource("/validate_token").route(web::post().to(validate_token)))
        .service(web::resource("/updateprofile").route(web::post().to(update_profile)))
        .service(web::resource("/insertproduct").route(web::post().to(insert_product)))
        .service(web::resource("/getproduct").route(web::get().to(get_products)))
        .service(web::resource("/updateproduct/{id}").route(web::put().to(update_product)))
        .service(web::resource("/deleteproduct/{id}").route(web::delete().to(delete_product)))
        .service(web::resource("/getslides").route(web::get().to(get_slides)))
        .service(web::resource("/insertslides").route(web::post().to(insert_slide)))
        .service(web::resource("/updateslides/{id}").route(web::put().to(update_slide)))
        .service(web::resource("/deleteslides/{id}").route(web::delete().to(delete_slide)))
        .service(web::resource("/generate_qr").route(web::post().to(generate_qr)))
        .service(
            web::resource("/chceck_payment_status").route(web::get().to(check_payment_status)),
        )
        // Public fetch route for uploaded images.
        .route("/uploads/{filename}", web::get().to(get_upload));
}

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub payments: Arc<PaymentQrService>,
    pub repo: Arc<dyn Repo>,
    pub images: Arc<dyn ImageStore>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

fn client_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

// ---------------- Multipart form handling ----------------

const UPLOAD_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_IMAGE_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

struct FormData {
    texts: HashMap<String, String>,
    files: HashMap<String, (String, Vec<u8>)>,
}

impl FormData {
    fn require(&self, key: &str) -> Result<String, ApiError> {
        self.texts
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::Validation(format!("missing field: {key}")))
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.texts.get(key).cloned().filter(|s| !s.is_empty())
    }
}

async fn read_form(mut payload: Multipart) -> Result<FormData, ApiError> {
    let mut form = FormData { texts: HashMap::new(), files: HashMap::new() };
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Validation("malformed multipart body".into())
    })? {
        let Some(name) = field.content_disposition().get_name().map(str::to_string) else {
            continue;
        };
        let filename = field.content_disposition().get_filename().map(str::to_string);

        let mut field_stream = field;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > UPLOAD_SIZE_LIMIT {
                return Err(ApiError::Validation("file too large".into()));
            }
            bytes.extend_from_slice(&chunk);
        }

        match filename {
            Some(f) if !f.is_empty() => {
                form.files.insert(name, (f, bytes));
            }
            _ => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| ApiError::Validation("form field is not valid UTF-8".into()))?;
                form.texts.insert(name, text);
            }
        }
    }
    Ok(form)
}

fn ensure_image(bytes: &[u8]) -> Result<(), ApiError> {
    let mime = infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    if !ALLOWED_IMAGE_MIME.contains(&mime.as_str()) {
        return Err(ApiError::UnsupportedMedia);
    }
    Ok(())
}

async fn store_image(
    images: &Arc<dyn ImageStore>,
    original_name: &str,
    bytes: &[u8],
) -> Result<String, ApiError> {
    ensure_image(bytes)?;
    let filename = unique_filename(original_name);
    images.save(&filename, bytes).await?;
    Ok(filename)
}

// ---------------- Auth handlers ----------------

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Email already registered")
    )
)]
pub async fn register(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_register(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }
    let session = data
        .auth
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    Ok(HttpResponse::Ok().json(RegisterResponse {
        token: session.token,
        name: session.user.name,
        email: session.user.email,
        user_id: session.user.user_id,
    }))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Bad credentials")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_login(&client_ip(&req)) {
            return Err(ApiError::RateLimited);
        }
    }
    let session = data.auth.login(&payload.email, &payload.password).await?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        token: session.token,
        name: session.user.name,
        email: session.user.email,
        profile_image: session.user.profile_image,
        user_id: session.user.user_id,
    }))
}

pub async fn logout() -> Result<HttpResponse, ApiError> {
    // Tokens are self-contained; nothing to revoke server-side.
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "User logged out successfully"})))
}

#[utoipa::path(
    post,
    path = "/validate_token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token holder identity", body = IdentityResponse),
        (status = 401, description = "Token invalid or expired"),
        (status = 404, description = "User no longer exists")
    )
)]
pub async fn validate_token(
    data: web::Data<AppState>,
    payload: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = data.auth.validate_token(&payload.token).await?;
    Ok(HttpResponse::Ok().json(IdentityResponse {
        user_id: user.user_id,
        name: user.name,
        email: user.email,
        profile_image: user.profile_image,
    }))
}

#[utoipa::path(
    post,
    path = "/updateprofile",
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "Wrong old password"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_profile(
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_form(payload).await?;
    let new_image = match form.files.get("profileImage") {
        Some((original, bytes)) => {
            ensure_image(bytes)?;
            Some(UploadedImage { original_name: original.clone(), bytes: bytes.clone() })
        }
        None => None,
    };
    let updated = data
        .auth
        .update_profile(ProfileUpdate {
            user_id: form.require("user_id")?,
            name: form.require("name")?,
            old_password: form.optional("oldPassword"),
            new_password: form.optional("newPassword"),
            new_image,
        })
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Profile updated successfully",
        "updated": {
            "name": updated.name,
            "profileImage": updated.profile_image,
        }
    })))
}

// ---------------- Product handlers ----------------

fn product_miss(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::ProductNotFound,
        other => other.into(),
    }
}

pub async fn insert_product(
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_form(payload).await?;
    let price: f64 = form
        .require("price")?
        .parse()
        .map_err(|_| ApiError::Validation("price must be a number".into()))?;
    let image = match form.files.get("image") {
        Some((original, bytes)) => Some(store_image(&data.images, original, bytes).await?),
        None => None,
    };
    let product = data
        .repo
        .create_product(Product {
            id: Uuid::new_v4().to_string(),
            name: form.require("name")?,
            description: form.require("description")?,
            price,
            image,
        })
        .await?;
    Ok(HttpResponse::Ok().json(product))
}

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/getproduct",
    params(
        ("page" = Option<u64>, Query, description = "Page number, 1-based"),
        ("limit" = Option<u64>, Query, description = "Items per page")
    ),
    responses((status = 200, description = "Paginated products, newest first", body = ProductPage))
)]
pub async fn get_products(
    data: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).max(1);
    let (products, total_count) = data.repo.list_products(page, limit).await?;
    let total_pages = (total_count + limit - 1) / limit;
    Ok(HttpResponse::Ok().json(ProductPage { page, limit, total_pages, total_count, products }))
}

pub async fn update_product(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_product(&id).await.map_err(product_miss)?;

    let form = read_form(payload).await?;
    let price: f64 = form
        .require("price")?
        .parse()
        .map_err(|_| ApiError::Validation("price must be a number".into()))?;

    let image = match form.files.get("image") {
        Some((original, bytes)) => {
            let filename = store_image(&data.images, original, bytes).await?;
            if let Some(old) = &existing.image {
                data.images.delete(old).await?;
            }
            Some(filename)
        }
        None => existing.image.clone(),
    };

    let product = data
        .repo
        .update_product(Product {
            id,
            name: form.require("name")?,
            description: form.require("description")?,
            price,
            image,
        })
        .await
        .map_err(product_miss)?;
    Ok(HttpResponse::Ok().json(product))
}

pub async fn delete_product(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let removed = data.repo.delete_product(&id).await.map_err(product_miss)?;
    if let Some(image) = &removed.image {
        data.images.delete(image).await?;
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Product with ID '{id}' deleted successfully."),
    })))
}

// ---------------- Slideshow handlers ----------------

pub async fn get_slides(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let slides = data.repo.list_slides().await?;
    Ok(HttpResponse::Ok().json(slides))
}

pub async fn insert_slide(
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let form = read_form(payload).await?;
    let image = match form.files.get("image") {
        Some((original, bytes)) => Some(store_image(&data.images, original, bytes).await?),
        None => None,
    };
    let slide = data
        .repo
        .create_slide(Slide {
            id: Uuid::new_v4().to_string(),
            description: form.require("description")?,
            image,
        })
        .await?;
    Ok(HttpResponse::Ok().json(slide))
}

pub async fn update_slide(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_slide(&id).await?;

    let form = read_form(payload).await?;
    let image = match form.files.get("image") {
        Some((original, bytes)) => {
            let filename = store_image(&data.images, original, bytes).await?;
            if let Some(old) = &existing.image {
                data.images.delete(old).await?;
            }
            Some(filename)
        }
        None => existing.image.clone(),
    };

    let slide = data
        .repo
        .update_slide(Slide { id, description: form.require("description")?, image })
        .await?;
    Ok(HttpResponse::Ok().json(slide))
}

pub async fn delete_slide(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let removed = data.repo.delete_slide(&path.into_inner()).await?;
    if let Some(image) = &removed.image {
        data.images.delete(image).await?;
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({"message": "Slide deleted successfully"})))
}

// ---------------- Payment handlers ----------------

#[utoipa::path(
    post,
    path = "/generate_qr",
    request_body = CartQrRequest,
    responses(
        (status = 200, description = "Payment QR for the cart total", body = QrResponse),
        (status = 404, description = "A cart product does not exist"),
        (status = 502, description = "Payment network failure")
    )
)]
pub async fn generate_qr(
    data: web::Data<AppState>,
    payload: web::Json<CartQrRequest>,
) -> Result<HttpResponse, ApiError> {
    let generated = data.payments.generate_qr(&payload.product_ids).await?;
    Ok(HttpResponse::Ok().json(QrResponse {
        qr_image_base64_uri: generated.image_data_uri,
        md5: generated.digest,
        amount: generated.amount,
    }))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    md5: Option<String>,
}

#[utoipa::path(
    get,
    path = "/chceck_payment_status",
    params(("md5" = String, Query, description = "Digest returned by /generate_qr")),
    responses(
        (status = 200, description = "Settlement status", body = PaymentStatusResponse),
        (status = 404, description = "No record for digest"),
        (status = 502, description = "Payment network failure")
    )
)]
pub async fn check_payment_status(
    data: web::Data<AppState>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, ApiError> {
    let digest = query
        .into_inner()
        .md5
        .ok_or_else(|| ApiError::Validation("missing md5 query parameter".into()))?;
    let (status, record) = data.payments.check_status(&digest).await?;
    Ok(HttpResponse::Ok().json(PaymentStatusResponse {
        payment_status: status.as_str().to_string(),
        md5: record.digest,
        qrstring: record.payload,
        amount: record.amount,
    }))
}

// ---------------- Uploads ----------------

pub async fn get_upload(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let (bytes, mime) = data.images.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes))
}
