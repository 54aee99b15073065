//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use pact_engine_core::{
    lifecycle, limits, stats, CheckIn, CheckInRequest, CheckInStatus, EngineError,
    Pact, PactStats, Participant, ScheduleSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        due_handler,
        check_in_handler,
        stats_handler,
        archive_pact_handler,
        pact_limit_handler,
        create_pact_handler,
    ),
    components(
        schemas(
            DueResponse, CheckInPayload, CheckInStatusDto, CheckInResponse, StatsResponse,
            ParticipantStatsResponse, PactLimitResponse, CreatePactPayload, ParticipantPayload,
            PactResponse, ErrorResponse
        )
    ),
    tags(
        (name = "Pact API", description = "Check-ins, streaks and pact limits for accountability groups.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The body of every failed request.
#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub code: String,
    /// Safe to show to the end user.
    pub message: String,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize, ToSchema)]
pub struct DueResponse {
    pact_id: Uuid,
    date: NaiveDate,
    due: bool,
}

#[derive(Deserialize)]
pub struct DueQuery {
    date: Option<NaiveDate>,
}

#[derive(Deserialize, Serialize, ToSchema, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatusDto {
    Success,
    Fold,
}

impl From<CheckInStatusDto> for CheckInStatus {
    fn from(dto: CheckInStatusDto) -> Self {
        match dto {
            CheckInStatusDto::Success => CheckInStatus::Success,
            CheckInStatusDto::Fold => CheckInStatus::Fold,
        }
    }
}

impl From<CheckInStatus> for CheckInStatusDto {
    fn from(status: CheckInStatus) -> Self {
        match status {
            CheckInStatus::Success => CheckInStatusDto::Success,
            CheckInStatus::Fold => CheckInStatusDto::Fold,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CheckInPayload {
    status: CheckInStatusDto,
    excuse: Option<String>,
    /// Reference returned by the media upload service.
    proof_reference: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckInResponse {
    id: Uuid,
    pact_id: Uuid,
    user_id: Uuid,
    status: CheckInStatusDto,
    check_in_date: NaiveDate,
    excuse: Option<String>,
    proof_reference: Option<String>,
    is_late: bool,
    /// False when the check-in was made on a day the pact was not due.
    due: bool,
    created_at: DateTime<Utc>,
}

impl CheckInResponse {
    fn new(check_in: CheckIn, due: bool) -> Self {
        Self {
            id: check_in.id,
            pact_id: check_in.pact_id,
            user_id: check_in.user_id,
            status: check_in.status.into(),
            check_in_date: check_in.check_in_date,
            excuse: check_in.excuse,
            proof_reference: check_in.proof_reference,
            is_late: check_in.is_late,
            due,
            created_at: check_in.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct StatsQuery {
    through: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct ParticipantStatsResponse {
    user_id: Uuid,
    display_name: String,
    completion_rate: u8,
    total_check_ins: u32,
    success_count: u32,
    fold_count: u32,
    current_streak: u32,
    longest_streak: u32,
}

#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pact_id: Uuid,
    overall_completion_rate: u8,
    total_check_ins: u32,
    participants: Vec<ParticipantStatsResponse>,
}

impl From<PactStats> for StatsResponse {
    fn from(stats: PactStats) -> Self {
        Self {
            pact_id: stats.pact_id,
            overall_completion_rate: stats.overall_completion_rate,
            total_check_ins: stats.total_check_ins,
            participants: stats
                .participants
                .into_iter()
                .map(|p| ParticipantStatsResponse {
                    user_id: p.user_id,
                    display_name: p.display_name,
                    completion_rate: p.completion_rate,
                    total_check_ins: p.total_check_ins,
                    success_count: p.success_count,
                    fold_count: p.fold_count,
                    current_streak: p.current_streak,
                    longest_streak: p.longest_streak,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PactLimitResponse {
    current_count: u32,
    /// `null` when the group's tier is unlimited.
    max_count: Option<u32>,
    can_create: bool,
}

#[derive(Deserialize, Serialize, ToSchema, Clone)]
pub struct ParticipantPayload {
    user_id: Uuid,
    display_name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePactPayload {
    name: String,
    /// One of `daily`, `weekly`, `custom`.
    frequency: String,
    /// Weekday indices, 0 = Sunday. Required for `custom`.
    frequency_days: Option<Vec<i16>>,
    /// `standard` (default) or `relay`.
    pact_type: Option<String>,
    /// Weekday indices per participant. Required for `relay`.
    relay_days: Option<BTreeMap<Uuid, Vec<i16>>>,
    /// In join order. Must include the caller.
    participants: Vec<ParticipantPayload>,
    /// Offset whose calendar decides which day a check-in counts for (default 0).
    utc_offset_minutes: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct PactResponse {
    id: Uuid,
    group_id: Uuid,
    name: String,
    frequency: String,
    frequency_days: Option<Vec<i16>>,
    pact_type: String,
    relay_days: Option<BTreeMap<Uuid, Vec<i16>>>,
    status: String,
    created_on: NaiveDate,
    utc_offset_minutes: i32,
    participants: Vec<ParticipantPayload>,
}

impl From<Pact> for PactResponse {
    fn from(pact: Pact) -> Self {
        let spec = pact.cadence.to_spec();
        Self {
            id: pact.id,
            group_id: pact.group_id,
            name: pact.name,
            frequency: spec.frequency,
            frequency_days: spec.frequency_days,
            pact_type: spec.pact_type,
            relay_days: spec.relay_days,
            status: pact.status.as_str().to_string(),
            created_on: pact.created_on,
            utc_offset_minutes: pact.utc_offset.local_minus_utc() / 60,
            participants: pact
                .participants
                .into_iter()
                .map(|p| ParticipantPayload {
                    user_id: p.user_id,
                    display_name: p.display_name,
                })
                .collect(),
        }
    }
}

//=========================================================================================
// Error Mapping and Request Helpers
//=========================================================================================

/// Maps an engine failure to an HTTP status and a user-facing body.
pub fn reject(err: EngineError) -> Rejection {
    let (status, code) = match &err {
        EngineError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
        EngineError::NotParticipant => (StatusCode::FORBIDDEN, "not_participant"),
        EngineError::PactNotFound(_) => (StatusCode::NOT_FOUND, "pact_not_found"),
        EngineError::PactArchived => (StatusCode::CONFLICT, "pact_archived"),
        EngineError::AlreadyCheckedIn => (StatusCode::CONFLICT, "already_checked_in"),
        EngineError::PactLimitReached { .. } => (StatusCode::CONFLICT, "pact_limit_reached"),
        EngineError::InvalidPactConfiguration(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_pact_configuration")
        }
        EngineError::PersistenceFailure(_) => (StatusCode::SERVICE_UNAVAILABLE, "try_again"),
        EngineError::SideEffectFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, "try_again"),
    };
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    let message = match &err {
        // Validation details help the client fix the request.
        EngineError::InvalidPactConfiguration(reason) => reason.clone(),
        _ => err.user_message().to_string(),
    };
    (
        status,
        Json(ErrorResponse {
            code: code.to_string(),
            message,
        }),
    )
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Whether the pact is due for the caller on a date (default: today).
///
/// "Today" is the server's date in the pact's offset. A pact that cannot be
/// read is reported as not due.
#[utoipa::path(
    get,
    path = "/pacts/{pact_id}/due",
    responses(
        (status = 200, description = "Due status resolved", body = DueResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Pact not found", body = ErrorResponse)
    ),
    params(
        ("pact_id" = Uuid, Path, description = "The pact to resolve."),
        ("date" = Option<NaiveDate>, Query, description = "Calendar date, YYYY-MM-DD.")
    )
)]
pub async fn due_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(pact_id): Path<Uuid>,
    Query(query): Query<DueQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let verdict = lifecycle::due_for(app_state.store.as_ref(), user_id, pact_id, query.date, Utc::now())
        .await
        .map_err(reject)?;

    Ok(Json(DueResponse {
        pact_id,
        date: verdict.date,
        due: verdict.due,
    }))
}

/// Record today's check-in for the caller.
#[utoipa::path(
    post,
    path = "/pacts/{pact_id}/check-ins",
    request_body = CheckInPayload,
    responses(
        (status = 201, description = "Check-in recorded", body = CheckInResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Pact not found", body = ErrorResponse),
        (status = 409, description = "Already checked in today, or pact archived", body = ErrorResponse),
        (status = 503, description = "Store unavailable; try again", body = ErrorResponse)
    ),
    params(
        ("pact_id" = Uuid, Path, description = "The pact being checked in to.")
    )
)]
pub async fn check_in_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(pact_id): Path<Uuid>,
    Json(payload): Json<CheckInPayload>,
) -> Result<impl IntoResponse, Rejection> {
    let request = CheckInRequest {
        pact_id,
        caller: Some(user_id),
        status: payload.status.into(),
        excuse: payload.excuse,
        proof_reference: payload.proof_reference,
        submitted_at: Utc::now(),
    };

    let recorded = app_state
        .recorder
        .record_check_in(request)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(CheckInResponse::new(recorded.check_in, recorded.due)),
    ))
}

/// Streaks and completion rates for every participant of a pact.
#[utoipa::path(
    get,
    path = "/pacts/{pact_id}/stats",
    responses(
        (status = 200, description = "Stats computed", body = StatsResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Pact not found", body = ErrorResponse)
    ),
    params(
        ("pact_id" = Uuid, Path, description = "The pact to summarize."),
        ("through" = Option<NaiveDate>, Query, description = "Last day considered for missed-day folds (default: yesterday in the pact's offset).")
    )
)]
pub async fn stats_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(pact_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let pact = lifecycle::load_pact(app_state.store.as_ref(), pact_id)
        .await
        .map_err(reject)?;
    if !pact.is_participant(user_id) {
        return Err(reject(EngineError::NotParticipant));
    }

    let check_ins = app_state
        .store
        .get_check_ins_for_pact(pact_id)
        .await
        .map_err(|e| reject(e.into()))?;

    // Today is still open, so by default only finished days can count as missed.
    let through = match query.through {
        Some(date) => date,
        None => pact
            .local_date(Utc::now())
            .pred_opt()
            .unwrap_or(NaiveDate::MIN),
    };
    let policy = app_state.config.stats_policy(through);
    let stats = stats::compute_stats_with(&pact, &check_ins, &policy);

    Ok(Json(StatsResponse::from(stats)))
}

/// Archive a pact. Archived pacts stop counting toward the group's limit.
#[utoipa::path(
    post,
    path = "/pacts/{pact_id}/archive",
    responses(
        (status = 200, description = "Pact archived", body = PactResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Pact not found", body = ErrorResponse)
    ),
    params(
        ("pact_id" = Uuid, Path, description = "The pact to archive.")
    )
)]
pub async fn archive_pact_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(pact_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let pact = lifecycle::archive_pact(app_state.store.as_ref(), user_id, pact_id)
        .await
        .map_err(reject)?;
    Ok(Json(PactResponse::from(pact)))
}

/// How many active pacts the group has, and whether it may create another.
#[utoipa::path(
    get,
    path = "/groups/{group_id}/pact-limit",
    responses(
        (status = 200, description = "Limit evaluated", body = PactLimitResponse),
        (status = 503, description = "Store unavailable; try again", body = ErrorResponse)
    ),
    params(
        ("group_id" = Uuid, Path, description = "The group to check.")
    )
)]
pub async fn pact_limit_handler(
    State(app_state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let limit = limits::can_create_pact(
        app_state.store.as_ref(),
        app_state.subscriptions.as_ref(),
        group_id,
        app_state.config.free_tier_pact_limit,
    )
    .await
    .map_err(reject)?;

    Ok(Json(PactLimitResponse {
        current_count: limit.current_count,
        max_count: limit.max_count.as_option(),
        can_create: limit.can_create,
    }))
}

/// Create a pact in a group, subject to the group's pact limit.
#[utoipa::path(
    post,
    path = "/groups/{group_id}/pacts",
    request_body = CreatePactPayload,
    responses(
        (status = 201, description = "Pact created", body = PactResponse),
        (status = 403, description = "Caller is not among the participants", body = ErrorResponse),
        (status = 409, description = "Pact limit reached", body = ErrorResponse),
        (status = 422, description = "Invalid schedule", body = ErrorResponse)
    ),
    params(
        ("group_id" = Uuid, Path, description = "The owning group.")
    )
)]
pub async fn create_pact_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<CreatePactPayload>,
) -> Result<impl IntoResponse, Rejection> {
    if !payload.participants.iter().any(|p| p.user_id == user_id) {
        return Err(reject(EngineError::NotParticipant));
    }

    let spec = ScheduleSpec {
        frequency: payload.frequency,
        frequency_days: payload.frequency_days,
        pact_type: payload.pact_type.unwrap_or_else(|| "standard".to_string()),
        relay_days: payload.relay_days,
    };
    let participants = payload
        .participants
        .into_iter()
        .map(|p| Participant {
            user_id: p.user_id,
            display_name: p.display_name,
        })
        .collect();
    let new_pact = lifecycle::validate_new_pact(
        group_id,
        &payload.name,
        &spec,
        participants,
        payload.utc_offset_minutes.unwrap_or(0),
        Utc::now(),
    )
    .map_err(reject)?;
    let pact = lifecycle::create_pact(
        app_state.store.as_ref(),
        app_state.subscriptions.as_ref(),
        app_state.config.free_tier_pact_limit,
        new_pact,
    )
    .await
    .map_err(reject)?;

    info!("User {} created pact {}", user_id, pact.id);
    Ok((StatusCode::CREATED, Json(PactResponse::from(pact))))
}
