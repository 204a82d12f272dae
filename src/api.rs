//! HTTP API handlers for AdIntel.
//!
//! All handlers log with structured `tracing` fields. Analysis thresholds
//! default to the configured [`AnalysisParams`] and can be overridden per
//! request through the `days`, `min_ads` and `max_drop` query parameters.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::model::{
    AdCount, AdCountRequest, AnalysisQuery, CreateOfferRequest, Note, NoteRequest, Offer,
    OfferDetail, OfferListQuery, OfferSummary, PerformanceRequest, UpdateOfferRequest,
};
use crate::performance::{AnalysisParams, PerformanceAnalysis, analyze_offer_performance};
use crate::portfolio::{list_offer_summaries, offer_detail};
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub analysis: AnalysisParams,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/offers", get(list_offers).post(create_offer))
        .route(
            "/offers/:id",
            get(get_offer).patch(update_offer).delete(delete_offer),
        )
        .route("/offers/:id/archive", post(toggle_archive))
        .route("/offers/:id/ad-counts", post(record_ad_count))
        .route(
            "/offers/:id/ad-counts/:ad_count_id",
            delete(delete_ad_count),
        )
        .route("/offers/:id/notes", post(add_note))
        .route("/offers/:id/notes/:note_id", delete(delete_note))
        .route("/performance", post(analyze_performance))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /offers - List offers with a classification of their recent samples.
///
/// # Query Parameters
///
/// - `archived` (optional): list archived offers instead of active ones (default: false)
/// - `search` (optional): case-insensitive match on name or tags
/// - `days`, `min_ads`, `max_drop` (optional): analysis overrides
#[instrument(skip(state))]
pub async fn list_offers(
    State(state): State<AppState>,
    Query(query): Query<OfferListQuery>,
) -> Result<Json<Vec<OfferSummary>>, AppError> {
    let params = query.analysis().resolve(&state.analysis);

    let summaries = list_offer_summaries(&state.storage, &query.filter(), &params).await?;

    info!(
        offer_count = summaries.len(),
        archived = query.archived,
        "Offers listed"
    );

    Ok(Json(summaries))
}

/// POST /offers - Create an offer.
///
/// # Request Body
///
/// ```json
/// {
///     "name": "Keto Max",
///     "link": "https://example.com/keto",
///     "tags": "diet, supplements"
/// }
/// ```
///
/// `link` and `tags` are optional; `tags` may also be a JSON array.
///
/// # Response
///
/// Returns `201 Created` with the stored offer.
#[instrument(skip(state, request))]
pub async fn create_offer(
    State(state): State<AppState>,
    Json(request): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<Offer>), AppError> {
    let new_offer = request.validate().inspect_err(|e| {
        warn!(error = %e, "Rejected offer");
    })?;

    let offer = state.storage.insert_offer(&new_offer, Utc::now()).await?;

    info!(offer_id = offer.id, name = %offer.name, "Offer created");

    Ok((StatusCode::CREATED, Json(offer)))
}

/// GET /offers/:id - Offer with full history, notes and classification.
#[instrument(skip(state))]
pub async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<OfferDetail>, AppError> {
    let params = query.resolve(&state.analysis);

    let detail = offer_detail(&state.storage, id, &params)
        .await?
        .ok_or_else(|| offer_not_found(id))?;

    info!(
        offer_id = id,
        status = ?detail.performance.status,
        samples = detail.ad_counts.len(),
        "Offer detail queried"
    );

    Ok(Json(detail))
}

/// PATCH /offers/:id - Update name, link or tags.
#[instrument(skip(state, request))]
pub async fn update_offer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateOfferRequest>,
) -> Result<Json<Offer>, AppError> {
    let update = request.validate()?;

    let offer = state
        .storage
        .update_offer(id, &update, Utc::now())
        .await?
        .ok_or_else(|| offer_not_found(id))?;

    info!(offer_id = id, "Offer updated");

    Ok(Json(offer))
}

/// DELETE /offers/:id - Delete an offer with all its ad counts and notes.
#[instrument(skip(state))]
pub async fn delete_offer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !state.storage.delete_offer(id).await? {
        return Err(offer_not_found(id));
    }

    info!(offer_id = id, "Offer deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /offers/:id/archive - Flip the archived flag.
#[instrument(skip(state))]
pub async fn toggle_archive(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Offer>, AppError> {
    let offer = state
        .storage
        .toggle_archived(id, Utc::now())
        .await?
        .ok_or_else(|| offer_not_found(id))?;

    info!(offer_id = id, archived = offer.is_archived, "Offer archive toggled");

    Ok(Json(offer))
}

/// POST /offers/:id/ad-counts - Record the current number of active ads.
///
/// # Request Body
///
/// ```json
/// { "count": 42 }
/// ```
///
/// The timestamp is assigned server-side.
#[instrument(skip(state, request))]
pub async fn record_ad_count(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AdCountRequest>,
) -> Result<(StatusCode, Json<AdCount>), AppError> {
    if request.count < 0 {
        warn!(offer_id = id, count = request.count, "Rejected negative ad count");
        return Err(AppError::Validation(
            "ad count must be zero or greater".to_string(),
        ));
    }

    if state.storage.get_offer(id).await?.is_none() {
        return Err(offer_not_found(id));
    }

    let ad_count = state
        .storage
        .insert_ad_count(id, request.count, Utc::now())
        .await?;

    info!(offer_id = id, count = ad_count.count, "Ad count recorded");

    Ok((StatusCode::CREATED, Json(ad_count)))
}

/// DELETE /offers/:id/ad-counts/:ad_count_id - Remove one ad count.
///
/// The offer's latest count is refreshed from the remaining history.
#[instrument(skip(state))]
pub async fn delete_ad_count(
    State(state): State<AppState>,
    Path((id, ad_count_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    if !state.storage.delete_ad_count(id, ad_count_id).await? {
        return Err(AppError::NotFound(format!(
            "ad count {} of offer {}",
            ad_count_id, id
        )));
    }

    info!(offer_id = id, ad_count_id, "Ad count deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /offers/:id/notes - Attach a note.
#[instrument(skip(state, request))]
pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<NoteRequest>,
) -> Result<(StatusCode, Json<Note>), AppError> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("note text is required".to_string()));
    }

    if state.storage.get_offer(id).await?.is_none() {
        return Err(offer_not_found(id));
    }

    let note = state.storage.insert_note(id, text, Utc::now()).await?;

    info!(offer_id = id, note_id = note.id, "Note added");

    Ok((StatusCode::CREATED, Json(note)))
}

/// DELETE /offers/:id/notes/:note_id - Remove a note.
#[instrument(skip(state))]
pub async fn delete_note(
    State(state): State<AppState>,
    Path((id, note_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    if !state.storage.delete_note(id, note_id).await? {
        return Err(AppError::NotFound(format!(
            "note {} of offer {}",
            note_id, id
        )));
    }

    info!(offer_id = id, note_id, "Note deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /performance - Classify an arbitrary ad-count history.
///
/// # Request Body
///
/// ```json
/// {
///     "samples": [
///         { "count": 5, "timestamp": "2024-06-09T12:00:00Z" },
///         { "count": 20, "timestamp": "2024-06-15T12:00:00Z" }
///     ],
///     "days_to_analyze": 7
/// }
/// ```
///
/// Malformed samples are tolerated; the response is always a classification.
#[instrument(skip(state, request))]
pub async fn analyze_performance(
    State(state): State<AppState>,
    Json(request): Json<PerformanceRequest>,
) -> Json<PerformanceAnalysis> {
    let params = request.params(&state.analysis);
    let analysis = analyze_offer_performance(&request.samples, &params);

    info!(
        samples = request.samples.len(),
        status = ?analysis.status,
        period_change = %analysis.period_change,
        "Performance analyzed"
    );

    Json(analysis)
}

fn offer_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("offer {}", id))
}
