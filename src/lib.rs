//! Upload rights and copyright-risk verification service.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use state::AppState;

/// The full HTTP application for `state`.
pub fn build_router(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
