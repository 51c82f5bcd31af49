//! Router for the calendar API

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch},
};
use axum_extra::extract::Query;
use chrono::Utc;

use super::public;
use crate::api::Session;
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::google::gcal::{CalendarClient, DEFAULT_DAYS_AHEAD, DEFAULT_MAX_RESULTS, ListOptions};

type SharedState = Arc<RwLock<AppState>>;

fn calendar_client(state: &SharedState, session: &Session) -> Result<CalendarClient, ApiError> {
    let shared_state = state
        .read()
        .map_err(|_| anyhow!("Unable to read shared state"))?;
    Ok(CalendarClient::from_config(
        shared_state.http.clone(),
        &shared_state.config,
        &session.access_token,
    ))
}

/// List upcoming events, optionally matching a search query
async fn list_handler(
    State(state): State<SharedState>,
    session: Session,
    Query(params): Query<public::CalendarQuery>,
) -> Result<Json<public::EventsResponse>, ApiError> {
    let client = calendar_client(&state, &session)?;
    let options = ListOptions {
        query: params.q,
        max_results: params.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
        days_ahead: params.days_ahead.unwrap_or(DEFAULT_DAYS_AHEAD),
    };
    let events = client
        .list_events(&options, Utc::now())
        .await
        .map_err(|e| ApiError::calendar(e, "Failed to fetch events"))?;

    Ok(Json(public::EventsResponse { events }))
}

async fn create_handler(
    State(state): State<SharedState>,
    session: Session,
    Json(payload): Json<public::CreateEventRequest>,
) -> Result<Json<public::EventResponse>, ApiError> {
    let client = calendar_client(&state, &session)?;
    let event = client
        .create_event(payload)
        .await
        .map_err(|e| ApiError::calendar(e, "Failed to create event"))?;

    Ok(Json(public::EventResponse { event }))
}

/// Update only the fields given in the request body
async fn update_handler(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<String>,
    Json(payload): Json<public::UpdateEventRequest>,
) -> Result<Json<public::EventResponse>, ApiError> {
    let client = calendar_client(&state, &session)?;
    let event = client
        .update_event(&id, payload)
        .await
        .map_err(|e| ApiError::calendar(e, "Failed to update event"))?;

    Ok(Json(public::EventResponse { event }))
}

async fn delete_handler(
    State(state): State<SharedState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<public::DeleteEventResponse>, ApiError> {
    let client = calendar_client(&state, &session)?;
    client
        .delete_event(&id)
        .await
        .map_err(|e| ApiError::calendar(e, "Failed to delete event"))?;

    Ok(Json(public::DeleteEventResponse { success: true }))
}

/// Create the calendar router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route("/{id}", patch(update_handler).delete(delete_handler))
}
