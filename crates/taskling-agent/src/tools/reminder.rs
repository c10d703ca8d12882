use async_trait::async_trait;
use chrono_tz::Tz;
use serde_json::json;
use std::sync::Arc;
use taskling_common::{Error, Result};
use taskling_db::TaskStore;
use tokio::sync::Mutex;
use tracing::warn;

use crate::calendar::CalendarProvider;
use crate::dates::parse_when;
use crate::tools::{Tool, ToolContext, ToolOutput};

/// Schedules a reminder: a due-dated task, plus (when a calendar is
/// configured) a matching calendar event. Task first, calendar best-effort;
/// the task is never rolled back because the calendar step failed.
pub struct ScheduleReminder {
    store: Arc<Mutex<TaskStore>>,
    calendar: Option<Arc<dyn CalendarProvider>>,
}

impl ScheduleReminder {
    pub fn new(store: Arc<Mutex<TaskStore>>, calendar: Option<Arc<dyn CalendarProvider>>) -> Self {
        Self { store, calendar }
    }
}

#[async_trait]
impl Tool for ScheduleReminder {
    fn name(&self) -> &'static str {
        "schedule_reminder"
    }

    fn description(&self) -> &'static str {
        "Set a reminder for a task at a specific time. Accepts natural language times like \
         'tomorrow at 9am', 'in 2 hours', 'next friday', or an ISO datetime."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "What to be reminded about."
                },
                "when": {
                    "type": "string",
                    "description": "When to be reminded, in the user's words (e.g. 'tomorrow at 9am')."
                },
                "timezone": {
                    "type": "string",
                    "description": "IANA timezone name (e.g. 'Europe/London'). Only provide when the user states one."
                }
            },
            "required": ["description", "when"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let Some(description) = args["description"].as_str().map(str::trim) else {
            return Ok(ToolOutput::error("missing 'description' argument"));
        };
        if description.is_empty() {
            return Ok(ToolOutput::error("reminder description cannot be empty"));
        }
        let Some(when_text) = args["when"].as_str() else {
            return Ok(ToolOutput::error("missing 'when' argument"));
        };

        let tz: Tz = match args["timezone"].as_str() {
            Some(name) => match name.parse() {
                Ok(tz) => tz,
                Err(_) => return Ok(ToolOutput::error(format!("unknown timezone: '{name}'"))),
            },
            None => context.timezone,
        };

        let due = match parse_when(when_text, chrono::Utc::now(), tz) {
            Ok(due) => due,
            Err(Error::Validation(msg)) => {
                return Ok(ToolOutput::error(format!(
                    "I couldn't work out a time from '{when_text}': {msg}"
                )));
            }
            Err(e) => return Err(e),
        };

        let number = {
            let store = self.store.lock().await;
            store.insert_task(&context.user_id, description, Some(due))?
        };

        let due_local = due.with_timezone(&tz).format("%a %Y-%m-%d %H:%M %Z");
        let mut text = format!(
            "\u{2713} Reminder set for {due_local}: '{description}' (task #{number})"
        );

        if let Some(calendar) = &self.calendar {
            match calendar.create_event(description, due, tz).await {
                Ok(event_ref) => {
                    let store = self.store.lock().await;
                    if let Err(e) = store.update_event_ref(&context.user_id, number, &event_ref) {
                        warn!("created calendar event but failed to record it: {e}");
                    }
                    text.push_str(" with a calendar event.");
                }
                Err(e) => {
                    warn!("calendar event creation failed, keeping the task: {e}");
                    text.push_str(
                        ". Note: I couldn't create the calendar event, but the task is saved.",
                    );
                }
            }
        } else {
            text.push('.');
        }

        Ok(ToolOutput::success(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    struct BrokenCalendar;

    #[async_trait]
    impl CalendarProvider for BrokenCalendar {
        async fn create_event(
            &self,
            _description: &str,
            _start: DateTime<Utc>,
            _timezone: Tz,
        ) -> Result<String> {
            Err(Error::Transient("calendar is down".to_string()))
        }

        async fn delete_event(&self, _event_ref: &str) -> Result<()> {
            Err(Error::Transient("calendar is down".to_string()))
        }
    }

    struct RecordingCalendar;

    #[async_trait]
    impl CalendarProvider for RecordingCalendar {
        async fn create_event(
            &self,
            _description: &str,
            _start: DateTime<Utc>,
            _timezone: Tz,
        ) -> Result<String> {
            Ok("evt-42".to_string())
        }

        async fn delete_event(&self, _event_ref: &str) -> Result<()> {
            Ok(())
        }
    }

    fn context() -> ToolContext {
        ToolContext {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            timezone: Tz::UTC,
        }
    }

    #[tokio::test]
    async fn failing_calendar_still_creates_the_task() {
        let store = Arc::new(Mutex::new(TaskStore::in_memory().expect("store opens")));
        let tool = ScheduleReminder::new(store.clone(), Some(Arc::new(BrokenCalendar)));

        let out = tool
            .execute(
                &context(),
                json!({"description": "dentist", "when": "in 2 hours"}),
            )
            .await
            .expect("tool call succeeds");

        assert!(!out.is_error);
        assert!(out.content.contains("couldn't create the calendar event"));

        let tasks = store.lock().await.list_tasks("u1").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "dentist");
        assert!(tasks[0].due_at.is_some());
        assert!(tasks[0].event_ref.is_none());
    }

    #[tokio::test]
    async fn successful_calendar_records_the_event_ref() {
        let store = Arc::new(Mutex::new(TaskStore::in_memory().expect("store opens")));
        let tool = ScheduleReminder::new(store.clone(), Some(Arc::new(RecordingCalendar)));

        let out = tool
            .execute(
                &context(),
                json!({"description": "standup", "when": "tomorrow at 9am"}),
            )
            .await
            .expect("tool call succeeds");

        assert!(!out.is_error);
        assert!(out.content.contains("calendar event"));

        let tasks = store.lock().await.list_tasks("u1").unwrap();
        assert_eq!(tasks[0].event_ref.as_deref(), Some("evt-42"));
    }

    #[tokio::test]
    async fn unparseable_when_is_a_tool_error() {
        let store = Arc::new(Mutex::new(TaskStore::in_memory().expect("store opens")));
        let tool = ScheduleReminder::new(store.clone(), None);

        let out = tool
            .execute(
                &context(),
                json!({"description": "x", "when": "whenever you feel like it"}),
            )
            .await
            .expect("tool call succeeds");

        assert!(out.is_error);
        assert!(out.content.contains("couldn't work out a time"));

        // No task was created for the bad request.
        assert!(store.lock().await.list_tasks("u1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_calendar_configured_is_fine() {
        let store = Arc::new(Mutex::new(TaskStore::in_memory().expect("store opens")));
        let tool = ScheduleReminder::new(store, None);

        let out = tool
            .execute(
                &context(),
                json!({"description": "water plants", "when": "tonight"}),
            )
            .await
            .expect("tool call succeeds");

        assert!(!out.is_error);
        assert!(out.content.contains("Reminder set"));
    }
}
