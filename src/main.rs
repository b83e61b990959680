use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use rakshop::auth::AuthService;
use rakshop::config::AppConfig;
use rakshop::khqr::BakongClient;
use rakshop::openapi::ApiDoc;
use rakshop::payment::PaymentQrService;
use rakshop::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use rakshop::repo::Repo;
use rakshop::routes::{self, AppState};
use rakshop::storage::build_image_store;
use rakshop::token::TokenCodec;
use rakshop::RequestGate;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker, etc.)
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping rakshop server");

    if let Ok(addr) = std::env::var("PROMETHEUS_ADDR") {
        match addr.parse::<std::net::SocketAddr>() {
            Ok(sock) => match PrometheusBuilder::new().with_http_listener(sock).install() {
                Ok(()) => info!("Prometheus exporter listening on {sock}"),
                Err(e) => eprintln!("Failed to install Prometheus exporter: {e}"),
            },
            Err(_) => eprintln!("Invalid PROMETHEUS_ADDR '{addr}', exporter disabled"),
        }
    }

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn Repo> = {
        info!("Using in-memory repository backend");
        Arc::new(rakshop::repo::inmem::InMemRepo::new())
    };

    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn Repo> = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            eprintln!("Failed to run database migrations: {e}");
            std::process::exit(1);
        }
        info!("Using Postgres repository backend");
        Arc::new(rakshop::repo::pg::PgRepo::new(pool))
    };

    let image_store = build_image_store(&cfg.upload_dir);
    let codec = TokenCodec::new(&cfg.jwt_secret, cfg.token_ttl_secs);
    let auth = Arc::new(AuthService::new(repo.clone(), image_store.clone(), codec));

    let bakong = match BakongClient::new(&cfg.bakong) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to build payment network client: {e}");
            std::process::exit(1);
        }
    };
    let payments = Arc::new(PaymentQrService::new(repo.clone(), bakong, cfg.bakong.clone()));

    let rate_limiter = {
        let enabled = std::env::var("RL_ENABLED").map(|v| v != "0").unwrap_or(true);
        enabled.then(|| {
            RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env())
        })
    };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let state = AppState {
        auth: auth.clone(),
        payments,
        repo,
        images: image_store,
        rate_limiter,
    };

    let bind_addr = cfg.bind_addr.clone();
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // during local dev allow React/Vite default ports
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = &frontend_url {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(RequestGate::new(auth.clone()))
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .configure(routes::config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(web::Data::new(state.clone()))
    })
    .bind(&bind_addr)?;

    info!("Listening on http://{bind_addr}");

    server.run().await
}
