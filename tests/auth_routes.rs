#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use serde_json::{json, Value};
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

fn bakong_config(api_base: &str) -> BakongConfig {
    BakongConfig {
        api_base: api_base.into(),
        api_token: "test-token".into(),
        account: "sathyarak_keo@aclb".into(),
        merchant_name: "NEW GENERATION".into(),
        merchant_city: "Phnom Penh".into(),
        phone_number: "85581451884".into(),
        store_label: "RAKShop".into(),
        terminal_label: "Cashier-01".into(),
        currency: Currency::Khr,
        request_timeout: Duration::from_secs(2),
    }
}

// Fresh state over temp dirs; dirs are leaked so they outlive the state.
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
    let cfg = bakong_config("http://127.0.0.1:1");
    let payments = Arc::new(PaymentQrService::new(
        repo.clone(),
        BakongClient::new(&cfg).unwrap(),
        cfg,
    ));
    AppState { auth, payments, repo, images, rate_limiter: None }
}

fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, bytes)) = file {
        body.extend_from_slice(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

async fn body_json(resp: actix_web::dev::ServiceResponse) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

#[actix_web::test]
#[serial]
async fn register_token_validates_to_same_user() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(&json!({"name": "Alice", "email": "alice@example.com", "password": "s3cret"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = body_json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["user_id"].as_str().unwrap().to_string();
    assert!(token.len() > 10);

    let req = test::TestRequest::post()
        .uri("/validate_token")
        .set_json(&json!({ "token": token }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let identity = body_json(resp).await;
    assert_eq!(identity["user_id"].as_str().unwrap(), user_id);
    assert_eq!(identity["email"], "alice@example.com");
    assert_eq!(identity["profileImage"], "default.png");
}

#[actix_web::test]
#[serial]
async fn duplicate_email_is_rejected_once() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let payload = json!({"name": "A", "email": "dup@example.com", "password": "pw"});
    let req = test::TestRequest::post().uri("/register").set_json(&payload).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post().uri("/register").set_json(&payload).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "user already exists");
}

#[actix_web::test]
#[serial]
async fn login_failure_message_does_not_reveal_which_field_was_wrong() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(&json!({"name": "B", "email": "b@example.com", "password": "rightpw"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    // Wrong password for a real account.
    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(&json!({"email": "b@example.com", "password": "wrongpw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let wrong_pw = body_json(resp).await;

    // Unknown email entirely.
    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(&json!({"email": "nobody@example.com", "password": "rightpw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let no_user = body_json(resp).await;

    assert_eq!(wrong_pw["error"], no_user["error"]);
    assert_eq!(wrong_pw["error"], "incorrect email or password");
}

#[actix_web::test]
#[serial]
async fn login_returns_fresh_token_and_profile() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(&json!({"name": "C", "email": "c@example.com", "password": "pw"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(&json!({"email": "c@example.com", "password": "pw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = body_json(resp).await;
    assert_eq!(body["name"], "C");
    assert_eq!(body["profileImage"], "default.png");
    assert!(body["token"].as_str().unwrap().len() > 10);
}

#[actix_web::test]
#[serial]
async fn validate_token_rejects_garbage() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/validate_token")
        .set_json(&json!({"token": "notatoken"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn wrong_old_password_leaves_stored_hash_untouched() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(&json!({"name": "D", "email": "d@example.com", "password": "original"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let user_id = body_json(resp).await["user_id"].as_str().unwrap().to_string();

    let (ct, body) = multipart_body(
        "XBOUNDARY",
        &[
            ("name", "D"),
            ("user_id", &user_id),
            ("oldPassword", "wrong"),
            ("newPassword", "stolen"),
        ],
        None,
    );
    let req = test::TestRequest::post()
        .uri("/updateprofile")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // The original password still logs in; the attempted one does not.
    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(&json!({"email": "d@example.com", "password": "original"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(&json!({"email": "d@example.com", "password": "stolen"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
#[serial]
async fn profile_update_changes_name_and_password() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(&json!({"name": "E", "email": "e@example.com", "password": "oldpw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let user_id = body_json(resp).await["user_id"].as_str().unwrap().to_string();

    let (ct, body) = multipart_body(
        "XBOUNDARY",
        &[
            ("name", "Eve"),
            ("user_id", &user_id),
            ("oldPassword", "oldpw"),
            ("newPassword", "newpw"),
        ],
        None,
    );
    let req = test::TestRequest::post()
        .uri("/updateprofile")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = body_json(resp).await;
    assert_eq!(body["updated"]["name"], "Eve");

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(&json!({"email": "e@example.com", "password": "newpw"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await["name"], "Eve");
}

#[actix_web::test]
#[serial]
async fn updating_unknown_user_is_not_found() {
    let state = test_state();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state)).configure(rakshop::config_routes),
    )
    .await;

    let (ct, body) = multipart_body(
        "XBOUNDARY",
        &[("name", "Ghost"), ("user_id", "no-such-user")],
        None,
    );
    let req = test::TestRequest::post()
        .uri("/updateprofile")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
