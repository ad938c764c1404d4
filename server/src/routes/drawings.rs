use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use data::annotation::{Annotation, AnnotationKind, AnnotationPatch, DrawingPoint, Style};
use serde::Deserialize;

use crate::db::drawings;
use crate::error::ApiError;
use crate::state::AppState;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[derive(Debug, Deserialize)]
pub struct DrawingsQuery {
    symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDrawing {
    symbol: String,
    #[serde(rename = "type")]
    kind: AnnotationKind,
    points: Vec<DrawingPoint>,
    #[serde(default)]
    style: Option<Style>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/drawings", get(list_drawings).post(create_drawing))
        .route("/api/drawings/{id}", put(update_drawing).delete(delete_drawing))
}

async fn list_drawings(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DrawingsQuery>,
) -> Result<Json<Vec<Annotation>>, ApiError> {
    let conn = state.pool.get()?;
    Ok(Json(drawings::list(&conn, q.symbol.trim())?))
}

async fn create_drawing(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDrawing>,
) -> Result<(StatusCode, Json<Annotation>), ApiError> {
    let symbol = req.symbol.trim();
    if symbol.is_empty() {
        return Err(ApiError::BadRequest("symbol is required".to_owned()));
    }
    Annotation::validate_points(req.kind, &req.points)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Caller style overlays the per-kind defaults.
    let mut style = Style::defaults_for(req.kind);
    if let Some(given) = req.style {
        style.merge(given);
    }

    let conn = state.pool.get()?;
    let created = drawings::create(&conn, symbol, req.kind, &req.points, &style, now_ms())?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_drawing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<AnnotationPatch>,
) -> Result<Json<Annotation>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("empty patch".to_owned()));
    }

    let mut conn = state.pool.get()?;
    drawings::update(&mut conn, id, patch, now_ms())?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("drawing {id}")))
}

async fn delete_drawing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let conn = state.pool.get()?;
    if drawings::delete(&conn, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("drawing {id}")))
    }
}
