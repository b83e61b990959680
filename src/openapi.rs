use crate::models::{
    CartQrRequest, IdentityResponse, LoginRequest, LoginResponse, PaymentRecord,
    PaymentStatusResponse, Product, ProductPage, QrResponse, RegisterRequest, RegisterResponse,
    Slide, TokenRequest, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::validate_token,
        crate::routes::update_profile,
        crate::routes::get_products,
        crate::routes::generate_qr,
        crate::routes::check_payment_status,
    ),
    components(schemas(
        User, Product, Slide, PaymentRecord,
        RegisterRequest, LoginRequest, TokenRequest,
        RegisterResponse, LoginResponse, IdentityResponse,
        CartQrRequest, QrResponse, PaymentStatusResponse, ProductPage
    )),
    tags(
        (name = "auth", description = "Account and session operations"),
        (name = "catalog", description = "Product and slideshow operations"),
        (name = "payments", description = "KHQR payment operations"),
    )
)]
pub struct ApiDoc;
