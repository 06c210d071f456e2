//! Schedule endpoints. All routes require an access token and only ever see
//! the caller's own schedules.
//!
//! - POST `/` - Book a slot
//! - GET `/?date=` - List a UTC day
//! - PUT `/{id}` - Move to another slot
//! - DELETE `/{id}` - Cancel

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt, UniqueResultExt, validate_uuid};
use crate::auth::{Auth, AuthenticatedUser};
use crate::db::{Database, Schedule};
use crate::impl_has_token_issuer;
use crate::jwt::TokenIssuer;

const SECONDS_PER_HOUR: i64 = 3600;
const SECONDS_PER_DAY: i64 = 86_400;
const SLOT_TAKEN: &str = "Schedule date is not available";

#[derive(Clone)]
pub struct SchedulesState {
    pub db: Database,
    pub issuer: Arc<TokenIssuer>,
}

impl_has_token_issuer!(SchedulesState);

pub fn router(state: SchedulesState) -> Router {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route("/{id}", put(update_schedule).delete(delete_schedule))
        .with_state(state)
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub date: String,
}

impl From<Schedule> for ScheduleResponse {
    fn from(schedule: Schedule) -> Self {
        Self {
            id: schedule.uuid,
            name: schedule.name,
            phone: schedule.phone,
            date: format_slot(schedule.date),
        }
    }
}

/// Parse an RFC 3339 instant and truncate it to the start of its hour.
fn parse_slot(raw: &str) -> Result<i64, ApiError> {
    let instant = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|_| ApiError::bad_request("Invalid date"))?;
    Ok(truncate_to_hour(instant.timestamp()))
}

fn truncate_to_hour(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(SECONDS_PER_HOUR)
}

fn format_slot(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Start of the UTC day named by `YYYY-MM-DD` or by any RFC 3339 instant.
fn parse_day(raw: &str) -> Result<i64, ApiError> {
    let raw = raw.trim();
    let day = match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(day) => day,
        Err(_) => DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc).date_naive())
            .map_err(|_| ApiError::bad_request("Invalid date"))?,
    };
    day.and_hms_opt(0, 0, 0)
        .map(|start| start.and_utc().timestamp())
        .ok_or_else(|| ApiError::bad_request("Invalid date"))
}

fn ensure_not_past(slot: i64) -> Result<(), ApiError> {
    if slot < Utc::now().timestamp() {
        return Err(ApiError::bad_request(
            "It is not allowed to schedule old date",
        ));
    }
    Ok(())
}

async fn caller_id(state: &SchedulesState, auth: &AuthenticatedUser) -> Result<i64, ApiError> {
    state
        .db
        .users()
        .get_by_uuid(&auth.user_id)
        .await
        .db_err("Failed to get user")?
        .map(|user| user.id)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

#[derive(Deserialize)]
struct CreateScheduleRequest {
    name: String,
    phone: String,
    date: String,
}

async fn create_schedule(
    State(state): State<SchedulesState>,
    Auth(auth): Auth,
    Json(payload): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller_id(&state, &auth).await?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }

    let slot = parse_slot(&payload.date)?;
    ensure_not_past(slot)?;

    let taken = state
        .db
        .schedules()
        .find_at(user_id, slot)
        .await
        .db_err("Failed to check schedule availability")?;
    if taken.is_some() {
        return Err(ApiError::bad_request(SLOT_TAKEN));
    }

    let uuid = uuid::Uuid::new_v4().to_string();
    let id = state
        .db
        .schedules()
        .create(&uuid, user_id, name, payload.phone.trim(), slot)
        .await
        .unique_err(SLOT_TAKEN, "Failed to create schedule")?;

    info!(user = %auth.user_id, schedule = %uuid, "Schedule created");

    Ok((
        StatusCode::CREATED,
        Json(ScheduleResponse::from(Schedule {
            id,
            uuid,
            user_id,
            name: name.to_string(),
            phone: payload.phone.trim().to_string(),
            date: slot,
        })),
    ))
}

#[derive(Deserialize)]
struct ListQuery {
    date: Option<String>,
}

async fn list_schedules(
    State(state): State<SchedulesState>,
    Auth(auth): Auth,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller_id(&state, &auth).await?;

    let start = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(raw) => parse_day(raw)?,
        None => {
            let now = Utc::now().timestamp();
            now - now.rem_euclid(SECONDS_PER_DAY)
        }
    };

    let schedules = state
        .db
        .schedules()
        .list_between(user_id, start, start + SECONDS_PER_DAY)
        .await
        .db_err("Failed to list schedules")?;

    Ok(Json(
        schedules
            .into_iter()
            .map(ScheduleResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[derive(Deserialize)]
struct UpdateScheduleRequest {
    date: String,
}

async fn update_schedule(
    State(state): State<SchedulesState>,
    Auth(auth): Auth,
    Path(id): Path<String>,
    Json(payload): Json<UpdateScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;
    let user_id = caller_id(&state, &auth).await?;

    let mut schedule = state
        .db
        .schedules()
        .get_by_uuid(user_id, &id)
        .await
        .db_err("Failed to get schedule")?
        .ok_or_else(|| ApiError::not_found("Schedule not found"))?;

    let slot = parse_slot(&payload.date)?;
    ensure_not_past(slot)?;

    let taken = state
        .db
        .schedules()
        .find_at(user_id, slot)
        .await
        .db_err("Failed to check schedule availability")?;
    if taken.is_some_and(|other| other.uuid != schedule.uuid) {
        return Err(ApiError::bad_request(SLOT_TAKEN));
    }

    let updated = state
        .db
        .schedules()
        .update_date(user_id, &id, slot)
        .await
        .unique_err(SLOT_TAKEN, "Failed to update schedule")?;
    if !updated {
        return Err(ApiError::not_found("Schedule not found"));
    }

    schedule.date = slot;
    Ok(Json(ScheduleResponse::from(schedule)))
}

async fn delete_schedule(
    State(state): State<SchedulesState>,
    Auth(auth): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&id)?;
    let user_id = caller_id(&state, &auth).await?;

    let deleted = state
        .db
        .schedules()
        .delete(user_id, &id)
        .await
        .db_err("Failed to delete schedule")?;
    if !deleted {
        return Err(ApiError::not_found("Schedule not found"));
    }

    info!(user = %auth.user_id, schedule = %id, "Schedule deleted");
    Ok(StatusCode::NO_CONTENT)
}
