//! API routes module

pub mod ai;
pub mod calendar;

use std::sync::{Arc, RwLock};

use crate::api::state::AppState;
use axum::Router;

type SharedState = Arc<RwLock<AppState>>;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Calendar event routes
        .nest("/calendar", calendar::router())
        // Assistant routes
        .nest("/ai", ai::router())
}
