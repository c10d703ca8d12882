use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use taskling_common::{Error, Result};

/// Default event length when the user gives only a start time.
const DEFAULT_EVENT_MINUTES: i64 = 30;

/// Popup reminder lead time, in minutes.
const REMINDER_LEAD_MINUTES: i64 = 10;

/// External calendar collaborator. Strictly best-effort from the caller's
/// point of view: a failure here must never undo the task it accompanies.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Create an event and return an opaque reference to it.
    async fn create_event(
        &self,
        description: &str,
        start: DateTime<Utc>,
        timezone: Tz,
    ) -> Result<String>;

    async fn delete_event(&self, event_ref: &str) -> Result<()>;
}

/// Google-Calendar-shaped HTTP calendar client.
pub struct HttpCalendarProvider {
    client: Client,
    base_url: String,
    calendar_id: String,
    api_token: String,
}

impl HttpCalendarProvider {
    pub fn new(base_url: impl Into<String>, calendar_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            calendar_id: calendar_id.into(),
            api_token: api_token.into(),
        }
    }
}

#[async_trait]
impl CalendarProvider for HttpCalendarProvider {
    async fn create_event(
        &self,
        description: &str,
        start: DateTime<Utc>,
        timezone: Tz,
    ) -> Result<String> {
        let url = format!("{}/calendars/{}/events", self.base_url, self.calendar_id);
        let end = start + chrono::Duration::minutes(DEFAULT_EVENT_MINUTES);

        let body = json!({
            "summary": description,
            "start": {
                "dateTime": start.to_rfc3339(),
                "timeZone": timezone.name(),
            },
            "end": {
                "dateTime": end.to_rfc3339(),
                "timeZone": timezone.name(),
            },
            "reminders": {
                "useDefault": false,
                "overrides": [
                    { "method": "popup", "minutes": REMINDER_LEAD_MINUTES }
                ],
            },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("calendar request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transient(format!(
                "calendar API error ({status}): {text}"
            )));
        }

        let created: CreatedEvent = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("failed to parse calendar response: {e}")))?;
        Ok(created.id)
    }

    async fn delete_event(&self, event_ref: &str) -> Result<()> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url, self.calendar_id, event_ref
        );

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("calendar request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transient(format!(
                "calendar API error ({}) deleting event",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CreatedEvent {
    id: String,
}
