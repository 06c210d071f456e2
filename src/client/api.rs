//! Typed calls for the slotbook API, all routed through the session guard.

use chrono::{DateTime, NaiveDate, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::error::ClientError;
use super::guard::SessionGuard;
use super::session::{SessionStore, UserProfile};
use super::transport::{ApiRequest, Transport};

/// Hours of the day that can be booked.
pub const BOOKABLE_HOURS: std::ops::RangeInclusive<u32> = 9..=19;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub date: DateTime<Utc>,
}

/// Fields for `PUT /users`. The password only changes when both old and
/// new are given.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "oldPassword", skip_serializing_if = "Option::is_none")]
    pub old_password: Option<String>,
    #[serde(rename = "newPassword", skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

#[derive(Deserialize)]
struct SignInResponse {
    token: String,
    refresh_token: String,
    user: UserProfile,
}

pub struct ApiClient<T> {
    guard: SessionGuard<T>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
        }
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, store: Arc<dyn SessionStore>) -> Self {
        Self {
            guard: SessionGuard::new(transport, store),
        }
    }

    pub fn guard(&self) -> &SessionGuard<T> {
        &self.guard
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        self.guard.store()
    }

    /// Profile of the signed-in user, if any.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.store().user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisteredUser, ClientError> {
        self.guard
            .send(ApiRequest::post(
                "/users",
                json!({ "name": name, "email": email, "password": password }),
            ))
            .await?
            .json()
    }

    /// Log in and persist the token pair and profile.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let response: SignInResponse = self
            .guard
            .send(ApiRequest::post(
                "/users/auth",
                json!({ "email": email, "password": password }),
            ))
            .await?
            .json()?;

        self.store()
            .save_session(&response.token, &response.refresh_token, &response.user);
        info!(email = %response.user.email, "Signed in");

        Ok(response.user)
    }

    pub fn sign_out(&self) {
        self.store().clear_session();
    }

    /// Update the profile; a new name is mirrored into the stored profile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), ClientError> {
        let body = serde_json::to_value(update).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.guard.send(ApiRequest::put("/users", body)).await?;

        if let (Some(name), Some(mut user)) = (update.name.as_deref(), self.current_user()) {
            user.name = name.to_string();
            self.store().set_user(&user);
        }
        Ok(())
    }

    pub async fn create_schedule(
        &self,
        name: &str,
        phone: &str,
        date: DateTime<Utc>,
    ) -> Result<ScheduleEntry, ClientError> {
        self.guard
            .send(ApiRequest::post(
                "/schedules",
                json!({ "name": name, "phone": phone, "date": format_instant(date) }),
            ))
            .await?
            .json()
    }

    pub async fn list_schedules(&self, day: NaiveDate) -> Result<Vec<ScheduleEntry>, ClientError> {
        self.guard
            .send(ApiRequest::get(format!(
                "/schedules?date={}",
                day.format("%Y-%m-%d")
            )))
            .await?
            .json()
    }

    pub async fn reschedule(
        &self,
        id: &str,
        date: DateTime<Utc>,
    ) -> Result<ScheduleEntry, ClientError> {
        self.guard
            .send(ApiRequest::put(
                format!("/schedules/{}", id),
                json!({ "date": format_instant(date) }),
            ))
            .await?
            .json()
    }

    pub async fn cancel_schedule(&self, id: &str) -> Result<(), ClientError> {
        self.guard
            .send(ApiRequest::delete(format!("/schedules/{}", id)))
            .await?;
        Ok(())
    }
}

fn format_instant(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Bookable hours not taken by any of `booked`.
pub fn available_hours(booked: &[ScheduleEntry]) -> Vec<u32> {
    BOOKABLE_HOURS
        .filter(|hour| !booked.iter().any(|entry| entry.date.hour() == *hour))
        .collect()
}
