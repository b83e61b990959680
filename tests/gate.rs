#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

use rakshop::auth::AuthService;
use rakshop::config::{BakongConfig, Currency};
use rakshop::khqr::BakongClient;
use rakshop::payment::PaymentQrService;
use rakshop::repo::inmem::InMemRepo;
use rakshop::repo::Repo;
use rakshop::routes::AppState;
use rakshop::storage::{FsImageStore, ImageStore};
use rakshop::token::TokenCodec;
use rakshop::RequestGate;

fn test_state() -> AppState {
    let data_dir = tempfile::tempdir().unwrap();
    std::env::set_var("RAKSHOP_DATA_DIR", data_dir.path());
    let upload_dir = tempfile::tempdir().unwrap();

    let repo: Arc<dyn Repo> = Arc::new(InMemRepo::new());
    let images: Arc<dyn ImageStore> = Arc::new(FsImageStore::new(upload_dir.path()).unwrap());
    std::mem::forget(data_dir);
    std::mem::forget(upload_dir);

    let codec = TokenCodec::new("test-secret-must-be-32-bytes-long!!", 3600);
    let auth = Arc::new(AuthService::new(repo.clone(), images.clone(), codec));
    let cfg = BakongConfig {
        api_base: "http://127.0.0.1:1".into(),
        api_token: "test-token".into(),
        account: "acct@bank".into(),
        merchant_name: "Shop".into(),
        merchant_city: "Phnom Penh".into(),
        phone_number: String::new(),
        store_label: String::new(),
        terminal_label: String::new(),
        currency: Currency::Khr,
        request_timeout: Duration::from_secs(2),
    };
    let payments = Arc::new(PaymentQrService::new(
        repo.clone(),
        BakongClient::new(&cfg).unwrap(),
        cfg,
    ));
    AppState { auth, payments, repo, images, rate_limiter: None }
}

macro_rules! gated_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(RequestGate::new($state.auth.clone()))
                .app_data(web::Data::new($state.clone()))
                .configure(rakshop::config_routes),
        )
        .await
    };
}

#[actix_web::test]
#[serial]
async fn public_routes_pass_without_a_header() {
    let state = test_state();
    let app = gated_app!(state);

    let req = test::TestRequest::get().uri("/getproduct").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get().uri("/getslides").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
#[serial]
async fn protected_route_without_header_is_rejected_before_the_handler() {
    let state = test_state();
    let app = gated_app!(state);

    // An empty cart would be a 400 from the handler; the bare 401 proves the
    // gate fired first.
    let req = test::TestRequest::post()
        .uri("/generate_qr")
        .set_json(&json!({"product_ids": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn malformed_bearer_token_is_unauthorized() {
    let state = test_state();
    let app = gated_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate_qr")
        .insert_header(("Authorization", "Bearer notatoken"))
        .set_json(&json!({"product_ids": []}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/generate_qr")
        .insert_header(("Authorization", "Basic dXNlcjpwdw=="))
        .set_json(&json!({"product_ids": []}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn valid_token_reaches_the_handler() {
    let state = test_state();
    let session = state.auth.register("F", "f@example.com", "pw").await.unwrap();
    let app = gated_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate_qr")
        .insert_header(("Authorization", format!("Bearer {}", session.token)))
        .set_json(&json!({"product_ids": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    // Past the gate; the handler rejects the empty cart.
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn expired_token_is_rejected() {
    let state = test_state();
    let session = state.auth.register("G", "g@example.com", "pw").await.unwrap();
    let stale = state
        .auth
        .codec()
        .issue_with_ttl(&session.user.user_id, -120)
        .unwrap();
    let app = gated_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate_qr")
        .insert_header(("Authorization", format!("Bearer {stale}")))
        .set_json(&json!({"product_ids": []}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn token_for_vanished_user_is_rejected() {
    let state = test_state();
    let ghost = state.auth.codec().issue("no-such-user").unwrap();
    let app = gated_app!(state);

    let req = test::TestRequest::post()
        .uri("/generate_qr")
        .insert_header(("Authorization", format!("Bearer {ghost}")))
        .set_json(&json!({"product_ids": []}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}
