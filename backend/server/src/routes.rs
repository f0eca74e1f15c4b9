//! # Routes
//!
//! All vote routes need an `x-auth-token` header, see [`crate::auth`].
//!
//! - `GET /api/votes`: today's counts and the caller's own votes
//! - `POST /api/votes`: `{"meal": "lunch"}`, 201 with the refreshed view
//! - `DELETE /api/votes/reset`: admin only, drains today's ledger
//!
//! Errors are `{"message": "..."}`.
use std::sync::Arc;

use axum::{
    Json,
    extract::{State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, identity::Identity, ledger::MealCounts, state::State};

#[derive(Deserialize)]
pub struct VoteRequest {
    meal: String,
}

#[derive(Serialize)]
pub struct ResetResponse {
    message: &'static str,
    counts: MealCounts,
}

pub async fn health_handler() -> &'static str {
    "Smart Mess Backend is running!"
}

pub async fn status_handler(
    AxumState(state): AxumState<Arc<State>>,
    identity: Identity,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.votes.status(&identity).await?;

    Ok((StatusCode::OK, Json(summary)))
}

pub async fn vote_handler(
    AxumState(state): AxumState<Arc<State>>,
    identity: Identity,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|_| AppError::MalformedPayload)?;

    let summary = state.votes.cast_vote(&identity, &request.meal).await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn reset_handler(
    AxumState(state): AxumState<Arc<State>>,
    identity: Identity,
) -> Result<impl IntoResponse, AppError> {
    let counts = state.votes.reset_today(&identity).await?;

    Ok((
        StatusCode::OK,
        Json(ResetResponse {
            message: "Votes for today have been reset successfully.",
            counts,
        }),
    ))
}
