//! Gram deployment server
//!
//! HTTP surface over [`gram_core::deployments::DeploymentService`] with
//! bearer API-key authentication.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use routes::create_router;
pub use state::AppState;
