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
use rakshop::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use rakshop::repo::inmem::InMemRepo;
use rakshop::repo::Repo;
use rakshop::routes::AppState;
use rakshop::storage::{FsImageStore, ImageStore};
use rakshop::token::TokenCodec;

fn throttled_state(login_limit: usize, register_limit: usize) -> AppState {
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
        api_token: "t".into(),
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
    let rate_limiter = Some(RateLimiterFacade::new(
        InMemoryRateLimiter::new(true),
        RateLimitConfig {
            login_limit,
            login_window: Duration::from_secs(60),
            register_limit,
            register_window: Duration::from_secs(60),
        },
    ));
    AppState { auth, payments, repo, images, rate_limiter }
}

#[actix_web::test]
#[serial]
async fn login_attempts_over_the_window_limit_are_throttled() {
    let state = throttled_state(2, 100);
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let attempt = json!({"email": "x@example.com", "password": "pw"});
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/login")
            .peer_addr("9.9.9.9:1234".parse().unwrap())
            .set_json(&attempt)
            .to_request();
        // No such account, but the attempt is counted before authentication.
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
    let req = test::TestRequest::post()
        .uri("/login")
        .peer_addr("9.9.9.9:1234".parse().unwrap())
        .set_json(&attempt)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);

    // A different client address gets its own window.
    let req = test::TestRequest::post()
        .uri("/login")
        .peer_addr("8.8.8.8:1234".parse().unwrap())
        .set_json(&attempt)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
#[serial]
async fn registration_is_throttled_independently() {
    let state = throttled_state(100, 1);
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .peer_addr("9.9.9.9:1234".parse().unwrap())
        .set_json(&json!({"name": "A", "email": "a@example.com", "password": "pw"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/register")
        .peer_addr("9.9.9.9:1234".parse().unwrap())
        .set_json(&json!({"name": "B", "email": "b@example.com", "password": "pw"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);
}
