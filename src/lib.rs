pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod khqr;
pub mod models;
pub mod openapi;
pub mod payment;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod storage; // expose storage for routes
pub mod token;

// Re-export commonly used items for tests / external users
pub use config::{AppConfig, BakongConfig, Currency};
pub use gate::RequestGate;
pub use routes::{config as config_routes, AppState};
pub use token::TokenCodec;
